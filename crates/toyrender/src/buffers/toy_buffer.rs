use crate::buffers::{BufferSource, FrameContext, GlBuffer, ProgramHost};
use crate::compiler::PreprocessorDefines;
use crate::error::{Error, Result};
use crate::gl::DrawState;
use crate::inputs::Input;
use crate::io_resource::{IoResource, OutputSpec};
use crate::size::Rsize;

/// Runs Shadertoy `mainImage` code over the screen quad.
#[derive(Debug)]
pub struct ToyBuffer {
    sources: Vec<BufferSource>,
    defines: PreprocessorDefines,
    state: DrawState,
    host: ProgramHost,
    target: Option<GlBuffer>,
}

impl ToyBuffer {
    pub fn new(sources: Vec<BufferSource>) -> Self {
        Self {
            sources,
            defines: PreprocessorDefines::new(),
            state: DrawState::default(),
            host: ProgramHost::new(),
            target: None,
        }
    }

    pub fn with_defines(mut self, defines: PreprocessorDefines) -> Self {
        self.defines = defines;
        self
    }

    pub fn sources(&self) -> &[BufferSource] {
        &self.sources
    }

    /// Defines local to this buffer; changing them takes effect on the next `init`.
    pub fn defines_mut(&mut self) -> &mut PreprocessorDefines {
        &mut self.defines
    }

    pub fn state_mut(&mut self) -> &mut DrawState {
        &mut self.state
    }

    pub fn host(&self) -> &ProgramHost {
        &self.host
    }

    /// Framebuffer plumbing, present once `init` has run.
    pub fn target(&self) -> Option<&GlBuffer> {
        self.target.as_ref()
    }

    pub fn outputs(&self) -> Vec<OutputSpec> {
        self.host.outputs()
    }

    pub fn set_input(&mut self, name: &str, input: Input) -> Result<()> {
        self.host.set_input(name, input);
        Ok(())
    }

    pub fn init(&mut self, frame: &FrameContext<'_>) -> Result<()> {
        if self.target.is_none() {
            self.target = Some(GlBuffer::new(frame.gl)?);
        }
        self.compile(frame)
    }

    fn compile(&mut self, frame: &FrameContext<'_>) -> Result<()> {
        let parts = self.sources.iter().map(BufferSource::to_part).collect();
        self.host.compile(frame, &self.defines, parts, None)
    }

    pub fn resize(&mut self, size: Rsize) -> Result<bool> {
        match &mut self.target {
            Some(target) => target.resize(size),
            None => Ok(false),
        }
    }

    pub fn render(&mut self, frame: &FrameContext<'_>, output: &IoResource) -> Result<()> {
        if self.host.needs_compile() {
            self.compile(frame)?;
        }
        let target = self
            .target
            .as_ref()
            .ok_or(Error::InvalidState("toy buffer rendered before init"))?;
        let targets = output.targets();
        let size = output.size();
        let state = &self.state;
        self.host.draw(frame, size, || {
            target.render(&targets, size, state, || frame.geometry.draw())
        })
    }

    pub fn release(&mut self) {
        self.host.release();
        self.target = None;
    }
}
