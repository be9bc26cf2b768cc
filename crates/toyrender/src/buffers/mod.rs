//! Render passes.
//!
//! Types:
//!
//! - `GlBuffer` owns the framebuffer, depth renderbuffer and timer query
//!   every pass draws through.
//! - `ProgramHost` owns a compiled program and the inputs it samples.
//! - `ToyBuffer` runs Shadertoy `mainImage` code over the screen quad.
//! - `GeometryBuffer` draws its own geometry with its own vertex stage and
//!   takes no inputs.
//! - `Buffer` is the closed set of pass kinds a swap chain member holds.
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use crate::compiler::{Part, ProgramTemplate};
use crate::config::ContextConfig;
use crate::error::{Error, Result};
use crate::geometry::Geometry;
use crate::gl::{Gl, Texture};
use crate::inputs::Input;
use crate::io_resource::{IoResource, OutputSpec};
use crate::size::Rsize;
use crate::uniforms::ShadertoyUniforms;

pub mod geometry_buffer;
pub mod gl_buffer;
pub mod program_buffer;
pub mod toy_buffer;

pub use geometry_buffer::GeometryBuffer;
pub use gl_buffer::GlBuffer;
pub use program_buffer::ProgramHost;
pub use toy_buffer::ToyBuffer;

/// Everything a pass borrows from its context while it builds or draws.
pub struct FrameContext<'a> {
    pub gl: &'a Rc<dyn Gl>,
    pub template: &'a ProgramTemplate,
    pub uniforms: &'a ShadertoyUniforms,
    pub error_texture: &'a Rc<Texture>,
    pub geometry: &'a Geometry,
    pub config: &'a ContextConfig,
}

/// Shader code of a pass: a file read at compile time or inline text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferSource {
    File(PathBuf),
    Inline { name: String, text: String },
}

impl BufferSource {
    pub fn inline(name: impl Into<String>, text: impl Into<String>) -> Self {
        BufferSource::Inline {
            name: name.into(),
            text: text.into(),
        }
    }

    pub fn name(&self) -> String {
        match self {
            BufferSource::File(path) => path.display().to_string(),
            BufferSource::Inline { name, .. } => name.clone(),
        }
    }

    pub fn to_part(&self) -> Part {
        match self {
            BufferSource::File(path) => Part::file(self.name(), path),
            BufferSource::Inline { name, text } => Part::source(name.clone(), text.clone()),
        }
    }
}

impl From<PathBuf> for BufferSource {
    fn from(path: PathBuf) -> Self {
        BufferSource::File(path)
    }
}

#[derive(Debug)]
pub enum Buffer {
    Toy(ToyBuffer),
    Geometry(GeometryBuffer),
}

impl Buffer {
    pub fn init(&mut self, frame: &FrameContext<'_>) -> Result<()> {
        match self {
            Buffer::Toy(buffer) => buffer.init(frame),
            Buffer::Geometry(buffer) => buffer.init(frame),
        }
    }

    /// Reallocates size-dependent storage; no-op when `size` is unchanged.
    pub fn resize(&mut self, size: Rsize) -> Result<bool> {
        match self {
            Buffer::Toy(buffer) => buffer.resize(size),
            Buffer::Geometry(buffer) => buffer.resize(size),
        }
    }

    /// Draws into `output`'s current write slot.
    pub fn render(&mut self, frame: &FrameContext<'_>, output: &IoResource) -> Result<()> {
        match self {
            Buffer::Toy(buffer) => buffer.render(frame, output),
            Buffer::Geometry(buffer) => buffer.render(frame, output),
        }
    }

    pub fn set_input(&mut self, name: &str, input: Input) -> Result<()> {
        match self {
            Buffer::Toy(buffer) => buffer.set_input(name, input),
            Buffer::Geometry(buffer) => buffer.set_input(name, input),
        }
    }

    /// Fragment outputs the member allocates textures for.
    pub fn outputs(&self) -> Vec<OutputSpec> {
        match self {
            Buffer::Toy(buffer) => buffer.outputs(),
            Buffer::Geometry(buffer) => buffer.outputs(),
        }
    }

    /// Whether any input of this buffer samples `output`.
    pub fn reads(&self, output: &Rc<RefCell<IoResource>>) -> bool {
        match self {
            Buffer::Toy(buffer) => buffer.host().reads(output),
            Buffer::Geometry(_) => false,
        }
    }

    /// Nanoseconds spent in the last draw, as measured by the timer query.
    pub fn elapsed_ns(&self) -> Result<u64> {
        let target = match self {
            Buffer::Toy(buffer) => buffer.target(),
            Buffer::Geometry(buffer) => buffer.target(),
        };
        target
            .ok_or(Error::InvalidState("buffer has not been initialized"))?
            .elapsed_ns()
    }

    pub fn release(&mut self) {
        match self {
            Buffer::Toy(buffer) => buffer.release(),
            Buffer::Geometry(buffer) => buffer.release(),
        }
    }
}

impl From<ToyBuffer> for Buffer {
    fn from(buffer: ToyBuffer) -> Self {
        Buffer::Toy(buffer)
    }
}

impl From<GeometryBuffer> for Buffer {
    fn from(buffer: GeometryBuffer) -> Self {
        Buffer::Geometry(buffer)
    }
}
