use crate::buffers::{BufferSource, FrameContext, GlBuffer, ProgramHost};
use crate::compiler::{link_program, NamedSource, Part, PreprocessorDefines, ShaderCompiler};
use crate::error::{Error, Result};
use crate::geometry::Geometry;
use crate::gl::{BindGuard, Capability, ClearMask, DrawState, Program, ShaderStage};
use crate::inputs::Input;
use crate::io_resource::{IoResource, OutputSpec};
use crate::program::ProgramInterface;
use crate::shaders::{BUFFER_SOURCES, ERROR_PROGRAM_SOURCE};
use crate::size::Rsize;

/// Draws its own geometry with a complete vertex/fragment program.
///
/// Sources are used verbatim, without the toy template, and the buffer takes
/// no inputs. Depth testing is on and every frame starts from a cleared
/// color and depth buffer.
///
/// When the program fails to build and error substitution is enabled, the
/// template error program is drawn over the screen quad instead.
#[derive(Debug)]
pub struct GeometryBuffer {
    vertex: Vec<BufferSource>,
    fragment: Vec<BufferSource>,
    geometry: Option<Geometry>,
    state: DrawState,
    program: Option<Program>,
    interface: ProgramInterface,
    fallback: Option<ProgramHost>,
    target: Option<GlBuffer>,
}

fn named_sources(sources: &[BufferSource]) -> Result<Vec<NamedSource>> {
    let mut named = Vec::with_capacity(sources.len());
    for source in sources {
        named.extend(source.to_part().sources()?);
    }
    Ok(named)
}

impl GeometryBuffer {
    pub fn new(vertex: Vec<BufferSource>, fragment: Vec<BufferSource>) -> Self {
        let mut state = DrawState::default();
        state
            .enable(Capability::DepthTest)
            .set_clear([0.0, 0.0, 0.0, 0.0], ClearMask::COLOR_DEPTH);
        Self {
            vertex,
            fragment,
            geometry: None,
            state,
            program: None,
            interface: ProgramInterface::default(),
            fallback: None,
            target: None,
        }
    }

    /// Draws `geometry` instead of the context's screen quad.
    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = Some(geometry);
        self
    }

    pub fn state_mut(&mut self) -> &mut DrawState {
        &mut self.state
    }

    pub fn target(&self) -> Option<&GlBuffer> {
        self.target.as_ref()
    }

    pub fn interface(&self) -> &ProgramInterface {
        &self.interface
    }

    pub fn outputs(&self) -> Vec<OutputSpec> {
        match &self.fallback {
            Some(host) => host.outputs(),
            None => OutputSpec::from_interface(&self.interface),
        }
    }

    /// Whether the error program stands in for the real one.
    pub fn is_substituted(&self) -> bool {
        self.fallback.is_some()
    }

    pub fn set_input(&mut self, _name: &str, _input: Input) -> Result<()> {
        Err(Error::InvalidState("geometry buffers take no inputs"))
    }

    pub fn init(&mut self, frame: &FrameContext<'_>) -> Result<()> {
        if self.target.is_none() {
            self.target = Some(GlBuffer::new(frame.gl)?);
        }
        match self.build(frame) {
            Ok(()) => {
                self.fallback = None;
                Ok(())
            }
            Err(error) if frame.config.substitute_error_program && !error.is_systemic() => {
                tracing::error!(error = %error, "geometry program failed to build; using error program");
                self.program = None;
                self.interface = ProgramInterface::default();
                let mut host = ProgramHost::new();
                host.compile(
                    frame,
                    &PreprocessorDefines::new(),
                    vec![Part::source(BUFFER_SOURCES, ERROR_PROGRAM_SOURCE)],
                    None,
                )?;
                self.fallback = Some(host);
                Ok(())
            }
            Err(error) => {
                tracing::error!(error = %error, "geometry program failed to build");
                Err(error)
            }
        }
    }

    fn build(&mut self, frame: &FrameContext<'_>) -> Result<()> {
        let vertex = ShaderCompiler::new(named_sources(&self.vertex)?)
            .compile(frame.gl, ShaderStage::Vertex)?;
        let fragment = ShaderCompiler::new(named_sources(&self.fragment)?)
            .compile(frame.gl, ShaderStage::Fragment)?;
        let program = Program::new(frame.gl, ())?;
        link_program(&program, &[&vertex, &fragment])?;
        program.validate()?;
        self.interface = ProgramInterface::reflect(&program)?;
        self.program = Some(program);
        tracing::debug!(
            uniforms = self.interface.uniforms().len(),
            "linked geometry program"
        );
        Ok(())
    }

    pub fn resize(&mut self, size: Rsize) -> Result<bool> {
        match &mut self.target {
            Some(target) => target.resize(size),
            None => Ok(false),
        }
    }

    pub fn render(&mut self, frame: &FrameContext<'_>, output: &IoResource) -> Result<()> {
        if let Some(host) = &mut self.fallback {
            let target = self
                .target
                .as_ref()
                .ok_or(Error::InvalidState("geometry buffer rendered before init"))?;
            let targets = output.targets();
            let size = output.size();
            let state = &self.state;
            return host.draw(frame, size, || {
                target.render(&targets, size, state, || frame.geometry.draw())
            });
        }
        let (Some(program), Some(target)) = (&self.program, &self.target) else {
            return Err(Error::InvalidState("geometry buffer rendered before init"));
        };
        let size = output.size();
        let mut uniforms = frame.uniforms.clone();
        uniforms.set_resolution(size);
        uniforms.apply(&self.interface, program)?;

        let targets = output.targets();
        let geometry = self.geometry.as_ref().unwrap_or(frame.geometry);
        let _program = BindGuard::new(program, ())?;
        target.render(&targets, size, &self.state, || geometry.draw())
    }

    pub fn release(&mut self) {
        if let Some(host) = &mut self.fallback {
            host.release();
        }
        self.fallback = None;
        self.program = None;
        self.interface = ProgramInterface::default();
        self.target = None;
    }
}
