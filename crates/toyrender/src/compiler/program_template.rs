use std::collections::HashMap;
use std::rc::Rc;

use crate::compiler::defines::PreprocessorDefines;
use crate::compiler::part::{NamedSource, Part};
use crate::compiler::shader_compiler::ShaderCompiler;
use crate::compiler::shader_template::{PartOverrides, ShaderTemplate};
use crate::error::{Result, TemplateError};
use crate::gl::{Gl, Shader, ShaderStage};

/// Name of the shared define part every stage template declares.
pub const SHARED_DEFINES: &str = "glsl:defines";

/// Per-stage shader templates plus state shared by every program built from them.
#[derive(Debug)]
pub struct ProgramTemplate {
    stages: HashMap<ShaderStage, ShaderTemplate>,
    shared_defines: Vec<(String, PreprocessorDefines)>,
    precompiled: HashMap<ShaderStage, Rc<Shader>>,
}

impl Default for ProgramTemplate {
    fn default() -> Self {
        let mut defines = PreprocessorDefines::new();
        defines.define("LIBSHADERTOY", "1");
        Self {
            stages: HashMap::new(),
            shared_defines: vec![(SHARED_DEFINES.to_string(), defines)],
            precompiled: HashMap::new(),
        }
    }
}

impl ProgramTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_stage(&mut self, stage: ShaderStage, template: ShaderTemplate) {
        self.precompiled.remove(&stage);
        self.stages.insert(stage, template);
    }

    pub fn stage(&self, stage: ShaderStage) -> Option<&ShaderTemplate> {
        self.stages.get(&stage)
    }

    pub fn stage_mut(&mut self, stage: ShaderStage) -> Option<&mut ShaderTemplate> {
        self.precompiled.remove(&stage);
        self.stages.get_mut(&stage)
    }

    /// Shared defines filling the part called `name`, created empty on first use.
    pub fn shared_defines_mut(&mut self, name: &str) -> &mut PreprocessorDefines {
        let index = match self.shared_defines.iter().position(|(n, _)| n == name) {
            Some(index) => index,
            None => {
                self.shared_defines
                    .push((name.to_string(), PreprocessorDefines::new()));
                self.shared_defines.len() - 1
            }
        };
        self.precompiled.clear();
        &mut self.shared_defines[index].1
    }

    pub fn shared_defines(&self, name: &str) -> Option<&PreprocessorDefines> {
        self.shared_defines
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, defines)| defines)
    }

    /// The stage template with shared defines and then `overrides` applied.
    pub fn specify(&self, stage: ShaderStage, overrides: &PartOverrides) -> Result<ShaderTemplate> {
        let template = self
            .stages
            .get(&stage)
            .ok_or(TemplateError::MissingStage(stage))?;
        let mut all = PartOverrides::new();
        for (name, defines) in &self.shared_defines {
            if template.find(name).is_some() {
                all.insert(name.clone(), vec![Part::define(name.clone(), defines.clone())]);
            }
        }
        for (name, parts) in overrides {
            all.insert(name.clone(), parts.clone());
        }
        Ok(template.specify(&all)?)
    }

    pub fn sources(&self, stage: ShaderStage, overrides: &PartOverrides) -> Result<Vec<NamedSource>> {
        Ok(self.specify(stage, overrides)?.sources()?)
    }

    /// Compiles the stage with no overrides and keeps it for reuse.
    pub fn compile(&mut self, gl: &Rc<dyn Gl>, stage: ShaderStage) -> Result<Rc<Shader>> {
        let sources = self.sources(stage, &PartOverrides::new())?;
        let shader = Rc::new(ShaderCompiler::new(sources).compile(gl, stage)?);
        tracing::debug!(%stage, "precompiled shader stage");
        self.precompiled.insert(stage, Rc::clone(&shader));
        Ok(shader)
    }

    pub fn precompiled(&self, stage: ShaderStage) -> Option<&Rc<Shader>> {
        self.precompiled.get(&stage)
    }

    /// Drops every precompiled stage.
    pub fn release(&mut self) {
        self.precompiled.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> ProgramTemplate {
        let mut template = ProgramTemplate::new();
        let fragment = ShaderTemplate::parse(
            "#version 330 core\n#pragma toyrender part glsl:defines\n#pragma toyrender part buffer:sources\n",
            "fragment",
        )
        .unwrap();
        template.set_stage(ShaderStage::Fragment, fragment);
        template
    }

    #[test]
    fn shared_defines_fill_their_slot() {
        let mut template = template();
        template.shared_defines_mut(SHARED_DEFINES).define("QUALITY", "2");
        let overrides = PartOverrides::from([(
            "buffer:sources".to_string(),
            vec![Part::source("image", "void mainImage() {}\n")],
        )]);
        let sources = template.sources(ShaderStage::Fragment, &overrides).unwrap();
        let text: String = sources.iter().map(|s| s.source.as_str()).collect();
        assert_eq!(
            text,
            "#version 330 core\n#define LIBSHADERTOY 1\n#define QUALITY 2\nvoid mainImage() {}\n"
        );
        assert_eq!(sources[2].name, "image");
    }

    #[test]
    fn missing_stage_is_reported() {
        let template = template();
        let err = template
            .sources(ShaderStage::Vertex, &PartOverrides::new())
            .unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Template(TemplateError::MissingStage(ShaderStage::Vertex))
        ));
    }
}
