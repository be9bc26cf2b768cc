//! Ordered list of named parts that serializes to shader source.
//!
//! Templates are usually parsed from GLSL text annotated with pragmas:
//!
//! ```glsl
//! #version 330 core
//! #pragma toyrender part buffer:defines
//! #pragma toyrender part glsl:header begin
//! precision highp float;
//! #pragma toyrender part end
//! ```
//!
//! A bare `part <name>` line leaves an empty slot that must be specified
//! before the template can be serialized. A `begin` ... `end` block is a
//! replaceable default. Plain text between pragmas becomes literal parts
//! named `<prefix>-N`.
use std::collections::HashMap;
use std::path::Path;

use crate::compiler::part::{NamedSource, Part};
use crate::error::TemplateError;

/// Replacement parts keyed by the name of the part they stand in for.
pub type PartOverrides = HashMap<String, Vec<Part>>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShaderTemplate {
    parts: Vec<Part>,
}

enum Pragma<'a> {
    Slot(&'a str),
    Begin(&'a str),
    End,
}

fn parse_pragma(line: &str) -> Option<Pragma<'_>> {
    let mut tokens = line.split_whitespace();
    if tokens.next()? != "#pragma" || tokens.next()? != "toyrender" || tokens.next()? != "part" {
        return None;
    }
    let name = tokens.next()?;
    let pragma = match (name, tokens.next(), tokens.next()) {
        ("end", None, _) => Pragma::End,
        (name, None, _) => Pragma::Slot(name),
        (name, Some("begin"), None) => Pragma::Begin(name),
        _ => return None,
    };
    Some(pragma)
}

impl ShaderTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(source: &str, prefix: &str) -> Result<Self, TemplateError> {
        let mut template = Self::new();
        let mut literal = String::new();
        let mut literal_index = 0;
        let mut block: Option<(String, String)> = None;
        let mut line_number = 0;

        let flush = |template: &mut Self, literal: &mut String, index: &mut usize| {
            if literal.is_empty() {
                return Ok(());
            }
            let part = Part::source(format!("{prefix}-{index}"), std::mem::take(literal));
            *index += 1;
            template.push_back(part)
        };

        for line in source.lines() {
            line_number += 1;
            match (parse_pragma(line), block.is_some()) {
                (Some(Pragma::End), false) => {
                    return Err(TemplateError::UnmatchedEnd {
                        source_name: prefix.to_string(),
                        line: line_number,
                    })
                }
                (Some(Pragma::End), true) => {
                    if let Some((name, text)) = block.take() {
                        template.push_back(Part::source(name, text))?;
                    }
                }
                (Some(Pragma::Slot(name) | Pragma::Begin(name)), true) => {
                    return Err(TemplateError::UnexpectedSlot {
                        source_name: prefix.to_string(),
                        line: line_number,
                        slot: name.to_string(),
                    })
                }
                (Some(Pragma::Slot(name)), false) => {
                    flush(&mut template, &mut literal, &mut literal_index)?;
                    template.push_back(Part::slot(name))?;
                }
                (Some(Pragma::Begin(name)), false) => {
                    flush(&mut template, &mut literal, &mut literal_index)?;
                    block = Some((name.to_string(), String::new()));
                }
                (None, _) => {
                    let text = match block.as_mut() {
                        Some((_, text)) => text,
                        None => &mut literal,
                    };
                    text.push_str(line);
                    text.push('\n');
                }
            }
        }

        if let Some((part, _)) = block {
            return Err(TemplateError::UnexpectedEof {
                source_name: prefix.to_string(),
                part,
            });
        }
        flush(&mut template, &mut literal, &mut literal_index)?;
        Ok(template)
    }

    pub fn parse_file(path: &Path) -> Result<Self, TemplateError> {
        let source = std::fs::read_to_string(path).map_err(|source| TemplateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&source, &path.display().to_string())
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn find(&self, name: &str) -> Option<&Part> {
        self.parts.iter().find(|part| part.name() == name)
    }

    fn position(&self, name: &str) -> Result<usize, TemplateError> {
        self.parts
            .iter()
            .position(|part| part.name() == name)
            .ok_or_else(|| TemplateError::PartNotFound(name.to_string()))
    }

    fn ensure_unique(&self, name: &str, except: Option<usize>) -> Result<(), TemplateError> {
        match self.parts.iter().position(|part| part.name() == name) {
            Some(index) if Some(index) != except => {
                Err(TemplateError::DuplicatePart(name.to_string()))
            }
            _ => Ok(()),
        }
    }

    pub fn push_back(&mut self, part: Part) -> Result<(), TemplateError> {
        self.ensure_unique(part.name(), None)?;
        self.parts.push(part);
        Ok(())
    }

    /// Replaces the part called `name`; the new part may carry a new name.
    pub fn replace(&mut self, name: &str, part: Part) -> Result<(), TemplateError> {
        let index = self.position(name)?;
        self.ensure_unique(part.name(), Some(index))?;
        self.parts[index] = part;
        Ok(())
    }

    pub fn insert_before(&mut self, target: &str, part: Part) -> Result<(), TemplateError> {
        let index = self.position(target)?;
        self.ensure_unique(part.name(), None)?;
        self.parts.insert(index, part);
        Ok(())
    }

    pub fn insert_after(&mut self, target: &str, part: Part) -> Result<(), TemplateError> {
        let index = self.position(target)?;
        self.ensure_unique(part.name(), None)?;
        self.parts.insert(index + 1, part);
        Ok(())
    }

    pub fn erase(&mut self, name: &str) -> bool {
        let before = self.parts.len();
        self.parts.retain(|part| part.name() != name);
        self.parts.len() != before
    }

    pub fn is_specified(&self) -> bool {
        self.parts.iter().all(Part::is_specified)
    }

    /// Copy of the template with overridden parts spliced in.
    ///
    /// Fails when a part is still unspecified afterwards.
    pub fn specify(&self, overrides: &PartOverrides) -> Result<ShaderTemplate, TemplateError> {
        let mut parts = Vec::with_capacity(self.parts.len());
        for part in &self.parts {
            match overrides.get(part.name()) {
                Some(replacements) => parts.extend(replacements.iter().cloned()),
                None => parts.push(part.clone()),
            }
        }
        if let Some(part) = parts.iter().find(|part| !part.is_specified()) {
            return Err(TemplateError::Unspecified(part.name().to_string()));
        }
        Ok(ShaderTemplate { parts })
    }

    pub fn sources(&self) -> Result<Vec<NamedSource>, TemplateError> {
        let mut sources = Vec::with_capacity(self.parts.len());
        for part in &self.parts {
            sources.extend(part.sources()?);
        }
        Ok(sources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::defines::PreprocessorDefines;

    const TEMPLATE: &str = "#version 330 core\n\
        #pragma toyrender part buffer:defines\n\
        #pragma toyrender part glsl:header begin\n\
        precision highp float;\n\
        #pragma toyrender part end\n\
        void main() {}\n";

    #[test]
    fn parses_slots_blocks_and_literals() {
        let template = ShaderTemplate::parse(TEMPLATE, "frag").unwrap();
        let names: Vec<_> = template.parts().iter().map(Part::name).collect();
        assert_eq!(
            names,
            vec!["frag-0", "buffer:defines", "glsl:header", "frag-1"]
        );
        assert!(!template.is_specified());
        assert_eq!(
            template.find("glsl:header"),
            Some(&Part::source("glsl:header", "precision highp float;\n"))
        );
    }

    #[test]
    fn rejects_malformed_pragmas() {
        let unmatched = ShaderTemplate::parse("#pragma toyrender part end\n", "t");
        assert!(matches!(
            unmatched,
            Err(TemplateError::UnmatchedEnd { line: 1, .. })
        ));

        let nested = "#pragma toyrender part a begin\n#pragma toyrender part b\n";
        assert!(matches!(
            ShaderTemplate::parse(nested, "t"),
            Err(TemplateError::UnexpectedSlot { line: 2, .. })
        ));

        let eof = "#pragma toyrender part a begin\nfloat x;\n";
        assert!(matches!(
            ShaderTemplate::parse(eof, "t"),
            Err(TemplateError::UnexpectedEof { part, .. }) if part == "a"
        ));
    }

    #[test]
    fn specify_fills_slots_in_place() {
        let template = ShaderTemplate::parse(TEMPLATE, "frag").unwrap();
        let mut defines = PreprocessorDefines::new();
        defines.define("STEPS", "4");
        let overrides = PartOverrides::from([(
            "buffer:defines".to_string(),
            vec![Part::define("buffer:defines", defines)],
        )]);
        let specified = template.specify(&overrides).unwrap();
        let text: String = specified
            .sources()
            .unwrap()
            .into_iter()
            .map(|s| s.source)
            .collect();
        assert_eq!(
            text,
            "#version 330 core\n#define STEPS 4\nprecision highp float;\nvoid main() {}\n"
        );
        assert!(template.specify(&PartOverrides::new()).is_err());
    }

    #[test]
    fn edits_check_names() {
        let mut template = ShaderTemplate::new();
        template.push_back(Part::source("a", "a\n")).unwrap();
        template.insert_after("a", Part::source("c", "c\n")).unwrap();
        template.insert_before("c", Part::source("b", "b\n")).unwrap();
        assert!(matches!(
            template.push_back(Part::source("a", "")),
            Err(TemplateError::DuplicatePart(_))
        ));
        assert!(matches!(
            template.replace("missing", Part::source("x", "")),
            Err(TemplateError::PartNotFound(_))
        ));
        assert!(matches!(
            template.replace("a", Part::source("b", "")),
            Err(TemplateError::DuplicatePart(_))
        ));
        template.replace("a", Part::source("a", "A\n")).unwrap();
        assert!(template.erase("b"));
        let names: Vec<_> = template.parts().iter().map(Part::name).collect();
        assert_eq!(names, vec!["a", "c"]);
    }
}
