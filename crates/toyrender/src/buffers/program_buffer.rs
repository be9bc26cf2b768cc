//! Program compilation and input binding shared by program-driven passes.
use std::cell::RefCell;
use std::rc::Rc;

use crate::buffers::FrameContext;
use crate::compiler::{
    link_program, InputDeclaration, Part, PartOverrides, PreprocessorDefines, ShaderCompiler,
};
use crate::error::{Error, Result};
use crate::gl::{BindGuard, Program, Sampler, Shader, ShaderStage, Texture, UniformValue};
use crate::inputs::{Input, InputKind, CHANNEL_COUNT};
use crate::io_resource::{IoResource, OutputSpec};
use crate::program::ProgramInterface;
use crate::shaders::{BUFFER_DEFINES, BUFFER_INPUTS, BUFFER_SOURCES, ERROR_PROGRAM_SOURCE};
use crate::size::Rsize;
use crate::uniforms::ShadertoyUniforms;

/// Parses `iChannelN` into `N` for `N` below [`CHANNEL_COUNT`].
pub fn channel_index(name: &str) -> Option<usize> {
    let index: usize = name.strip_prefix("iChannel")?.parse().ok()?;
    (index < CHANNEL_COUNT).then_some(index)
}

/// A linked program, its reflected interface and the inputs it samples.
///
/// `iChannel0..3` always occupy texture units 0 to 3; named inputs follow
/// from unit [`CHANNEL_COUNT`] on, in the order they were added. A channel
/// with no input samples the context error texture.
#[derive(Debug)]
pub struct ProgramHost {
    channels: [Option<Input>; CHANNEL_COUNT],
    named: Vec<(String, Input)>,
    program: Option<Program>,
    interface: ProgramInterface,
    substituted: bool,
    needs_compile: bool,
}

impl Default for ProgramHost {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramHost {
    pub fn new() -> Self {
        Self {
            channels: Default::default(),
            named: Vec::new(),
            program: None,
            interface: ProgramInterface::default(),
            substituted: false,
            needs_compile: true,
        }
    }

    /// Assigns `input` to `iChannelN` or to a named sampler.
    ///
    /// A new named sampler changes the generated declarations and forces a
    /// recompile before the next draw.
    pub fn set_input(&mut self, name: &str, input: Input) {
        if let Some(index) = channel_index(name) {
            self.channels[index] = Some(input);
            return;
        }
        match self.named.iter_mut().find(|(existing, _)| existing == name) {
            Some((_, slot)) => *slot = input,
            None => {
                self.named.push((name.to_string(), input));
                self.needs_compile = true;
            }
        }
    }

    pub fn input(&self, name: &str) -> Option<&Input> {
        match channel_index(name) {
            Some(index) => self.channels[index].as_ref(),
            None => self
                .named
                .iter()
                .find(|(existing, _)| existing == name)
                .map(|(_, input)| input),
        }
    }

    /// Iterates inputs in texture unit order along with their units.
    fn inputs(&self) -> impl Iterator<Item = (u32, &Input)> {
        let channels = self
            .channels
            .iter()
            .enumerate()
            .filter_map(|(unit, input)| Some((unit as u32, input.as_ref()?)));
        let named = self
            .named
            .iter()
            .enumerate()
            .map(|(index, (_, input))| ((CHANNEL_COUNT + index) as u32, input));
        channels.chain(named)
    }

    pub fn reads(&self, output: &Rc<RefCell<IoResource>>) -> bool {
        self.inputs().any(|(_, input)| match input.kind() {
            InputKind::Buffer(buffer) => buffer.reads(output),
            _ => false,
        })
    }

    pub fn needs_compile(&self) -> bool {
        self.needs_compile || self.program.is_none()
    }

    /// Whether the error program stands in for the real one.
    pub fn is_substituted(&self) -> bool {
        self.substituted
    }

    pub fn program(&self) -> Option<&Program> {
        self.program.as_ref()
    }

    pub fn interface(&self) -> &ProgramInterface {
        &self.interface
    }

    /// Fragment outputs of the linked program, by location.
    pub fn outputs(&self) -> Vec<OutputSpec> {
        OutputSpec::from_interface(&self.interface)
    }

    fn declarations(&self) -> Vec<InputDeclaration> {
        self.named
            .iter()
            .map(|(name, input)| InputDeclaration {
                name: Some(name.clone()),
                ty: input.declaration_type(),
            })
            .collect()
    }

    /// Builds the fragment stage from the context template with this
    /// buffer's defines, named input declarations and `sources`.
    pub fn compile(
        &mut self,
        frame: &FrameContext<'_>,
        defines: &PreprocessorDefines,
        sources: Vec<Part>,
        vertex: Option<&Shader>,
    ) -> Result<()> {
        let mut overrides = PartOverrides::new();
        overrides.insert(
            BUFFER_DEFINES.to_string(),
            vec![Part::define(BUFFER_DEFINES, defines.clone())],
        );
        overrides.insert(
            BUFFER_INPUTS.to_string(),
            vec![Part::input(BUFFER_INPUTS, self.declarations())],
        );
        overrides.insert(BUFFER_SOURCES.to_string(), sources);

        match self.link(frame, &overrides, vertex) {
            Ok(()) => {
                self.substituted = false;
            }
            Err(error) if frame.config.substitute_error_program && !error.is_systemic() => {
                tracing::error!(error = %error, "buffer program failed to build; using error program");
                let mut fallback = PartOverrides::new();
                fallback.insert(
                    BUFFER_DEFINES.to_string(),
                    vec![Part::define(BUFFER_DEFINES, PreprocessorDefines::new())],
                );
                fallback.insert(
                    BUFFER_INPUTS.to_string(),
                    vec![Part::input(BUFFER_INPUTS, self.declarations())],
                );
                fallback.insert(
                    BUFFER_SOURCES.to_string(),
                    vec![Part::source(BUFFER_SOURCES, ERROR_PROGRAM_SOURCE)],
                );
                self.link(frame, &fallback, vertex)?;
                self.substituted = true;
            }
            Err(error) => {
                tracing::error!(error = %error, "buffer program failed to build");
                return Err(error);
            }
        }
        self.needs_compile = false;
        Ok(())
    }

    fn link(
        &mut self,
        frame: &FrameContext<'_>,
        overrides: &PartOverrides,
        vertex: Option<&Shader>,
    ) -> Result<()> {
        let sources = frame.template.sources(ShaderStage::Fragment, overrides)?;
        let compiler = ShaderCompiler::new(sources);
        if frame.config.log_sources {
            tracing::trace!(source = %compiler.source_text(), "assembled fragment source");
        }
        let fragment = compiler.compile(frame.gl, ShaderStage::Fragment)?;
        let vertex = match vertex {
            Some(vertex) => vertex,
            None => frame
                .template
                .precompiled(ShaderStage::Vertex)
                .map(Rc::as_ref)
                .ok_or(Error::InvalidState("vertex stage was not precompiled"))?,
        };

        let program = Program::new(frame.gl, ())?;
        link_program(&program, &[vertex, &fragment])?;
        let interface = ProgramInterface::reflect(&program)?;

        let units: Vec<(String, i32)> = (0..CHANNEL_COUNT)
            .map(|index| (format!("iChannel{index}"), index as i32))
            .chain(
                self.named
                    .iter()
                    .enumerate()
                    .map(|(index, (name, _))| (name.clone(), (CHANNEL_COUNT + index) as i32)),
            )
            .collect();
        for (name, unit) in units {
            interface.set_uniform(&program, &name, UniformValue::Int(unit))?;
        }
        program.validate()?;

        tracing::debug!(
            uniforms = interface.uniforms().len(),
            outputs = interface.outputs().len(),
            "linked buffer program"
        );
        self.program = Some(program);
        self.interface = interface;
        Ok(())
    }

    /// Resolves every input, binds textures and samplers to their units,
    /// uploads uniforms and runs `draw` with the program bound.
    pub fn draw(
        &mut self,
        frame: &FrameContext<'_>,
        size: Rsize,
        draw: impl FnOnce() -> Result<()>,
    ) -> Result<()> {
        let mut textures: Vec<(u32, Rc<Texture>)> = Vec::with_capacity(CHANNEL_COUNT);
        for index in 0..CHANNEL_COUNT {
            let texture = match &mut self.channels[index] {
                Some(input) => {
                    input.sampler(frame.gl)?;
                    input.resolve(frame.gl, frame.error_texture)?
                }
                None => Rc::clone(frame.error_texture),
            };
            textures.push((index as u32, texture));
        }
        for (index, (_, input)) in self.named.iter_mut().enumerate() {
            input.sampler(frame.gl)?;
            let texture = input.resolve(frame.gl, frame.error_texture)?;
            textures.push(((CHANNEL_COUNT + index) as u32, texture));
        }

        let mut uniforms: ShadertoyUniforms = frame.uniforms.clone();
        uniforms.set_resolution(size);
        for (unit, texture) in textures.iter().take(CHANNEL_COUNT) {
            let (width, height) = texture.size()?;
            uniforms.set_channel_resolution(
                *unit as usize,
                [width as f32, height as f32, 1.0],
            );
        }

        let program = self
            .program
            .as_ref()
            .ok_or(Error::InvalidState("buffer program is not compiled"))?;
        uniforms.apply(&self.interface, program)?;

        let mut texture_guards = Vec::with_capacity(textures.len());
        for (unit, texture) in &textures {
            texture_guards.push(BindGuard::new(texture.as_ref(), *unit)?);
        }
        let samplers: Vec<(u32, &Sampler)> = self
            .inputs()
            .filter_map(|(unit, input)| Some((unit, input.cached_sampler()?)))
            .collect();
        let mut sampler_guards = Vec::with_capacity(samplers.len());
        for (unit, sampler) in samplers {
            sampler_guards.push(BindGuard::new(sampler, unit)?);
        }

        let _program = BindGuard::new(program, ())?;
        draw()
    }

    pub fn reset_inputs(&mut self) {
        for input in self.channels.iter_mut().flatten() {
            input.reset();
        }
        for (_, input) in &mut self.named {
            input.reset();
        }
    }

    pub fn release(&mut self) {
        self.program = None;
        self.interface = ProgramInterface::default();
        self.needs_compile = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_names_map_to_units() {
        assert_eq!(channel_index("iChannel0"), Some(0));
        assert_eq!(channel_index("iChannel3"), Some(3));
        assert_eq!(channel_index("iChannel4"), None);
        assert_eq!(channel_index("noise"), None);
    }

    #[test]
    fn named_inputs_force_recompile_once() {
        let mut host = ProgramHost::new();
        host.needs_compile = false;
        host.set_input("iChannel1", Input::error());
        assert!(!host.needs_compile);
        host.set_input("noise", Input::error());
        assert!(host.needs_compile);
        host.needs_compile = false;
        host.set_input("noise", Input::error());
        assert!(!host.needs_compile);
        let units: Vec<u32> = host.inputs().map(|(unit, _)| unit).collect();
        assert_eq!(units, vec![1, 4]);
    }
}
