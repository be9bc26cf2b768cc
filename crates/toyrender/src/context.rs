//! The public surface driven by an application loop.
use std::fmt;
use std::rc::Rc;
use std::time::Instant;

use crate::buffers::{Buffer, FrameContext, GeometryBuffer, ToyBuffer};
use crate::compiler::{ProgramTemplate, ShaderTemplate, SHARED_DEFINES};
use crate::config::ContextConfig;
use crate::error::{Error, Result};
use crate::geometry::Geometry;
use crate::gl::{Gl, ShaderStage, Texture};
use crate::inputs::{error_texture, BufferInput, Input};
use crate::io_resource::SwapPolicy;
use crate::members::{BufferMember, ScreenMember, SCREEN_MEMBER};
use crate::shaders::{FRAGMENT_TEMPLATE, SCREEN_QUAD_VERTEX};
use crate::size::{ExplicitSizeRef, Rsize};
use crate::swap_chain::SwapChain;
use crate::uniforms::{FrameClock, ShadertoyUniforms};

/// Objects created by `initialize` and shared by every member.
struct Shared {
    geometry: Geometry,
    error_texture: Rc<Texture>,
}

/// Owns the buffer graph of one toy and renders it frame by frame.
///
/// Buffers are added first, then `initialize` builds programs and
/// allocates outputs. `render_frame` renders members in insertion order;
/// only context loss and out-of-memory errors escape it, everything else
/// degrades to error textures or the error program.
pub struct RenderContext {
    gl: Rc<dyn Gl>,
    config: ContextConfig,
    template: ProgramTemplate,
    chain: SwapChain,
    uniforms: ShadertoyUniforms,
    clock: FrameClock,
    window_size: ExplicitSizeRef<u32>,
    render_size: Rsize,
    shared: Option<Shared>,
}

impl fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderContext")
            .field("config", &self.config)
            .field("chain", &self.chain)
            .field("window_size", &self.window_size.get())
            .field("render_size", &self.render_size)
            .field("initialized", &self.shared.is_some())
            .finish()
    }
}

impl RenderContext {
    pub fn new(gl: Rc<dyn Gl>, config: ContextConfig) -> Result<Self> {
        config.validate()?;
        let mut template = ProgramTemplate::new();
        template.set_stage(
            ShaderStage::Vertex,
            ShaderTemplate::parse(SCREEN_QUAD_VERTEX, "vertex")?,
        );
        template.set_stage(
            ShaderStage::Fragment,
            ShaderTemplate::parse(FRAGMENT_TEMPLATE, "toy")?,
        );
        let shared_defines = template.shared_defines_mut(SHARED_DEFINES);
        shared_defines.define("TOYRENDER", "1");
        shared_defines.extend_from(&config.preprocessor_defines());

        let size = config.render_size.unwrap_or_default();
        Ok(Self {
            gl,
            config,
            template,
            chain: SwapChain::new(),
            uniforms: ShadertoyUniforms::new(size),
            clock: FrameClock::default(),
            window_size: ExplicitSizeRef::new(size),
            render_size: size,
            shared: None,
        })
    }

    pub fn gl(&self) -> &Rc<dyn Gl> {
        &self.gl
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn chain(&self) -> &SwapChain {
        &self.chain
    }

    /// Context-wide shader templates and shared defines.
    ///
    /// Changes apply to programs built by the next `initialize`.
    pub fn template_mut(&mut self) -> &mut ProgramTemplate {
        &mut self.template
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.is_some()
    }

    pub fn render_size(&self) -> Rsize {
        self.render_size
    }

    pub fn window_size(&self) -> Rsize {
        self.window_size.get()
    }

    /// Number of frames rendered since `initialize`.
    pub fn frame(&self) -> u32 {
        self.clock.frames()
    }

    pub fn uniforms(&self) -> &ShadertoyUniforms {
        &self.uniforms
    }

    /// Texture bound in place of inputs that failed to resolve.
    pub fn error_texture(&self) -> Option<&Rc<Texture>> {
        self.shared.as_ref().map(|shared| &shared.error_texture)
    }

    fn add_buffer(&mut self, name: &str, buffer: Buffer) -> Result<()> {
        if self.shared.is_some() {
            return Err(Error::InvalidState(
                "buffers must be added before the context is initialized",
            ));
        }
        self.chain
            .push(BufferMember::new(&self.gl, name, buffer))
    }

    pub fn add_toy_buffer(&mut self, name: &str, buffer: ToyBuffer) -> Result<()> {
        self.add_buffer(name, buffer.into())
    }

    pub fn add_geometry_buffer(&mut self, name: &str, buffer: GeometryBuffer) -> Result<()> {
        self.add_buffer(name, buffer.into())
    }

    /// An input reading the named buffer's last completed frame.
    pub fn buffer_input(&self, name: &str) -> Result<BufferInput> {
        self.chain
            .buffer(name)
            .map(BufferMember::input)
            .ok_or_else(|| Error::UnknownBuffer(name.to_string()))
    }

    /// Attaches `input` to `buffer` as `iChannelN` or as a named sampler.
    pub fn set_input(&mut self, buffer: &str, input_name: &str, input: Input) -> Result<()> {
        let member = self
            .chain
            .buffer_mut(buffer)
            .ok_or_else(|| Error::UnknownBuffer(buffer.to_string()))?;
        member.buffer_mut().set_input(input_name, input)?;
        if self.shared.is_some() {
            // self-references switch the member to double buffering
            member.allocate(self.render_size, self.config.internal_format)?;
        }
        Ok(())
    }

    pub fn set_swap_policy(&mut self, buffer: &str, policy: Option<SwapPolicy>) -> Result<()> {
        let member = self
            .chain
            .buffer_mut(buffer)
            .ok_or_else(|| Error::UnknownBuffer(buffer.to_string()))?;
        member.set_swap_policy(policy);
        if self.shared.is_some() {
            member.allocate(self.render_size, self.config.internal_format)?;
        }
        Ok(())
    }

    /// Sets `iMouse` for the following frames.
    pub fn set_mouse(&mut self, mouse: [f32; 4]) {
        self.uniforms.mouse = mouse;
    }

    pub fn initialize(&mut self, window_size: Rsize) -> Result<()> {
        if self.shared.is_some() {
            return Err(Error::InvalidState("context is already initialized"));
        }
        self.window_size.set(window_size);
        self.render_size = self.config.render_size.unwrap_or(window_size);

        let shared = Shared {
            geometry: Geometry::screen(&self.gl)?,
            error_texture: Rc::new(error_texture(&self.gl)?),
        };
        self.template.compile(&self.gl, ShaderStage::Vertex)?;

        if self.config.present_to_screen && self.chain.member(SCREEN_MEMBER).is_none() {
            if let Some(last) = self.chain.last_buffer() {
                let screen = ScreenMember::new(
                    SCREEN_MEMBER,
                    last,
                    Rc::new(self.window_size.clone()),
                );
                self.chain.push(screen)?;
            }
        }

        self.clock.reset();
        self.uniforms.set_resolution(self.render_size);
        let frame = FrameContext {
            gl: &self.gl,
            template: &self.template,
            uniforms: &self.uniforms,
            error_texture: &shared.error_texture,
            geometry: &shared.geometry,
            config: &self.config,
        };
        self.chain.init(&frame)?;
        self.chain
            .allocate(self.render_size, self.config.internal_format)?;
        self.shared = Some(shared);

        tracing::info!(
            members = self.chain.len(),
            window = %window_size,
            render = %self.render_size,
            format = ?self.config.internal_format,
            "initialized render context"
        );
        Ok(())
    }

    /// Renders every member once and returns the last buffer's output.
    pub fn render_frame(&mut self) -> Result<Rc<Texture>> {
        let shared = self
            .shared
            .as_ref()
            .ok_or(Error::InvalidState("render_frame called before initialize"))?;
        self.uniforms
            .update_time(&mut self.clock, Instant::now(), self.config.target_framerate);
        let frame = FrameContext {
            gl: &self.gl,
            template: &self.template,
            uniforms: &self.uniforms,
            error_texture: &shared.error_texture,
            geometry: &shared.geometry,
            config: &self.config,
        };
        let output = self.chain.render(&frame)?;
        tracing::trace!(
            frame = self.uniforms.frame,
            time = self.uniforms.time,
            "rendered frame"
        );
        Ok(output)
    }

    /// Follows a new window size. Outputs are reallocated in place when the
    /// render size changes.
    pub fn resize(&mut self, window_size: Rsize) -> Result<()> {
        self.window_size.set(window_size);
        let render_size = self.config.render_size.unwrap_or(window_size);
        if render_size == self.render_size {
            return Ok(());
        }
        self.render_size = render_size;
        self.uniforms.set_resolution(render_size);
        if self.shared.is_some() {
            self.chain
                .allocate(render_size, self.config.internal_format)?;
        }
        tracing::info!(window = %window_size, render = %render_size, "resized render context");
        Ok(())
    }

    /// Releases every graphics object owned by the context.
    pub fn shutdown(&mut self) {
        self.chain.release();
        self.template.release();
        self.shared = None;
        tracing::info!("shut down render context");
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        if self.shared.is_some() {
            self.shutdown();
        }
    }
}
