//! Swap chain members.
//!
//! A [`BufferMember`] pairs a buffer with the [`IoResource`] it renders
//! into; a [`ScreenMember`] copies another member's readable texture to the
//! default framebuffer.
use std::cell::RefCell;
use std::rc::Rc;

use crate::buffers::{Buffer, FrameContext, GlBuffer, ProgramHost};
use crate::compiler::{Part, PreprocessorDefines};
use crate::error::{Error, Result};
use crate::gl::{DrawState, Filter, Gl, TextureFormat, Texture, Wrap};
use crate::inputs::{BufferInput, Input, SamplerSettings};
use crate::io_resource::{IoResource, SwapPolicy};
use crate::shaders::{ERROR_COLOR, SCREEN_BLIT_FRAGMENT};
use crate::size::{Rsize, SizeRef};

/// A buffer and the textures it renders into.
#[derive(Debug)]
pub struct BufferMember {
    name: String,
    buffer: Buffer,
    output: Rc<RefCell<IoResource>>,
    policy: Option<SwapPolicy>,
    failed: bool,
}

impl BufferMember {
    pub fn new(gl: &Rc<dyn Gl>, name: impl Into<String>, buffer: impl Into<Buffer>) -> Self {
        Self {
            name: name.into(),
            buffer: buffer.into(),
            output: Rc::new(RefCell::new(IoResource::new(gl, SwapPolicy::SingleBuffer))),
            policy: None,
            failed: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut Buffer {
        &mut self.buffer
    }

    pub fn output(&self) -> &Rc<RefCell<IoResource>> {
        &self.output
    }

    /// An input reading this member's last completed frame.
    pub fn input(&self) -> BufferInput {
        BufferInput::new(self.name.clone(), &self.output)
    }

    /// Forces a swap policy; `None` double-buffers only buffers that read
    /// their own output.
    pub fn set_swap_policy(&mut self, policy: Option<SwapPolicy>) {
        self.policy = policy;
    }

    pub fn swap_policy(&self) -> SwapPolicy {
        self.policy.unwrap_or_else(|| {
            if self.buffer.reads(&self.output) {
                SwapPolicy::DoubleBuffer
            } else {
                SwapPolicy::SingleBuffer
            }
        })
    }

    /// Whether the last draw failed and the output holds the error color.
    pub fn failed(&self) -> bool {
        self.failed
    }

    pub fn init(&mut self, frame: &FrameContext<'_>) -> Result<()> {
        tracing::trace!(member = %self.name, "initializing member");
        self.buffer.init(frame)?;
        self.output.borrow_mut().set_outputs(self.buffer.outputs());
        Ok(())
    }

    /// Reallocates when a recompile changed the program's outputs.
    fn sync_outputs(&mut self) -> Result<()> {
        let policy = self.swap_policy();
        let mut output = self.output.borrow_mut();
        if output.set_outputs(self.buffer.outputs()) && !output.size().is_empty() {
            let (size, format) = (output.size(), output.format());
            output.allocate(size, format, policy)?;
        }
        Ok(())
    }

    pub fn allocate(&mut self, size: Rsize, format: TextureFormat) -> Result<()> {
        let policy = self.swap_policy();
        self.output.borrow_mut().allocate(size, format, policy)?;
        self.buffer.resize(size)?;
        Ok(())
    }

    /// Draws, then swaps. A failed draw leaves the error color in the
    /// written slot and still swaps; systemic failures are returned.
    pub fn render(&mut self, frame: &FrameContext<'_>) -> Result<()> {
        self.sync_outputs()?;
        let drawn = {
            let output = self.output.borrow();
            self.buffer.render(frame, &output)
        };
        match drawn {
            Ok(()) => self.failed = false,
            Err(error) if error.is_systemic() => return Err(error),
            Err(error) => {
                if !self.failed {
                    tracing::warn!(
                        member = %self.name,
                        error = %error,
                        "buffer draw failed; substituting error output"
                    );
                }
                self.failed = true;
                self.output.borrow().clear_target(ERROR_COLOR)?;
            }
        }
        self.output.borrow_mut().swap();
        Ok(())
    }

    pub fn release(&mut self) {
        self.buffer.release();
        self.output.borrow_mut().release();
    }
}

/// Presents a member's readable texture on the default framebuffer.
#[derive(Debug)]
pub struct ScreenMember {
    name: String,
    source: String,
    viewport: SizeRef,
    host: ProgramHost,
    target: Option<GlBuffer>,
    state: DrawState,
    failed: bool,
}

/// Name of the screen member appended by the context.
pub const SCREEN_MEMBER: &str = "present";

impl ScreenMember {
    /// Presents `source`, filling a viewport of the size `viewport` resolves to.
    pub fn new(name: impl Into<String>, source: &BufferMember, viewport: SizeRef) -> Self {
        let mut host = ProgramHost::new();
        host.set_input(
            "screenTexture",
            Input::buffer(source.input()).with_settings(SamplerSettings {
                min_filter: Filter::Nearest,
                mag_filter: Filter::Nearest,
                wrap: Wrap::ClampToEdge,
            }),
        );
        Self {
            name: name.into(),
            source: source.name().to_string(),
            viewport,
            host,
            target: None,
            state: DrawState::default(),
            failed: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the presented member.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn init(&mut self, frame: &FrameContext<'_>) -> Result<()> {
        if self.target.is_none() {
            self.target = Some(GlBuffer::new(frame.gl)?);
        }
        self.host.compile(
            frame,
            &PreprocessorDefines::new(),
            vec![Part::source("screen-blit", SCREEN_BLIT_FRAGMENT)],
            None,
        )
    }

    /// Whether the last presentation failed.
    pub fn failed(&self) -> bool {
        self.failed
    }

    /// Presents the source member. Only systemic failures are returned;
    /// anything else is logged and the frame goes on.
    pub fn render(&mut self, frame: &FrameContext<'_>) -> Result<()> {
        match self.present(frame) {
            Ok(()) => self.failed = false,
            Err(error) if error.is_systemic() => return Err(error),
            Err(error) => {
                if !self.failed {
                    tracing::warn!(
                        member = %self.name,
                        error = %error,
                        "screen presentation failed"
                    );
                }
                self.failed = true;
            }
        }
        Ok(())
    }

    fn present(&mut self, frame: &FrameContext<'_>) -> Result<()> {
        let target = self
            .target
            .as_ref()
            .ok_or(Error::InvalidState("screen member rendered before init"))?;
        let size = self.viewport.resolve();
        let state = &self.state;
        self.host.draw(frame, size, || {
            target.render(&[], size, state, || frame.geometry.draw())
        })
    }

    pub fn release(&mut self) {
        self.host.release();
        self.target = None;
    }
}

#[derive(Debug)]
pub enum Member {
    Buffer(BufferMember),
    Screen(ScreenMember),
}

impl Member {
    pub fn name(&self) -> &str {
        match self {
            Member::Buffer(member) => member.name(),
            Member::Screen(member) => member.name(),
        }
    }

    pub fn init(&mut self, frame: &FrameContext<'_>) -> Result<()> {
        match self {
            Member::Buffer(member) => member.init(frame),
            Member::Screen(member) => member.init(frame),
        }
    }

    pub fn allocate(&mut self, size: Rsize, format: TextureFormat) -> Result<()> {
        match self {
            Member::Buffer(member) => member.allocate(size, format),
            Member::Screen(_) => Ok(()),
        }
    }

    pub fn render(&mut self, frame: &FrameContext<'_>) -> Result<()> {
        match self {
            Member::Buffer(member) => member.render(frame),
            Member::Screen(member) => member.render(frame),
        }
    }

    /// The readable texture of a buffer member.
    pub fn readable(&self) -> Option<Rc<Texture>> {
        match self {
            Member::Buffer(member) => member.output().borrow().source_texture(),
            Member::Screen(_) => None,
        }
    }

    pub fn as_buffer(&self) -> Option<&BufferMember> {
        match self {
            Member::Buffer(member) => Some(member),
            Member::Screen(_) => None,
        }
    }

    pub fn as_buffer_mut(&mut self) -> Option<&mut BufferMember> {
        match self {
            Member::Buffer(member) => Some(member),
            Member::Screen(_) => None,
        }
    }

    pub fn release(&mut self) {
        match self {
            Member::Buffer(member) => member.release(),
            Member::Screen(member) => member.release(),
        }
    }
}

impl From<BufferMember> for Member {
    fn from(member: BufferMember) -> Self {
        Member::Buffer(member)
    }
}

impl From<ScreenMember> for Member {
    fn from(member: ScreenMember) -> Self {
        Member::Screen(member)
    }
}
