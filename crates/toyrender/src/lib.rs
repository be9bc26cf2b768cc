//! Multi-pass Shadertoy-style renderer over an injectable graphics backend.
//!
//! A [`RenderContext`] owns an ordered chain of buffers. Each buffer runs a
//! fragment program over a full-screen triangle, samples its inputs (images,
//! noise, other buffers) and writes one color output that later buffers or
//! the screen can read:
//!
//! ```text
//!   toy sources ─▶ ShaderTemplate ─▶ ShaderCompiler ─▶ Program
//!                                                        │
//!   Input::resolve ─▶ BindGuard (texture units) ─────────┤
//!                                                        ▼
//!   RenderContext::render_frame ─▶ SwapChain ─▶ BufferMember::render ─▶ IoResource::swap
//! ```
//!
//! Every graphics object is owned by exactly one [`gl::Resource`]; the
//! backend behind it is an `Rc<dyn Gl>`, either [`backend::headless`] (used
//! by the tests, no GPU required) or the `glow` backend behind the `glow`
//! feature.
pub mod backend;
pub mod buffers;
pub mod compiler;
pub mod config;
pub mod context;
pub mod error;
pub mod geometry;
pub mod gl;
pub mod inputs;
pub mod io_resource;
pub mod members;
pub mod program;
pub mod shaders;
pub mod size;
pub mod swap_chain;
pub mod uniforms;

pub use buffers::{Buffer, BufferSource, GeometryBuffer, ToyBuffer};
pub use config::{ConfigError, ContextConfig, DefineEntry};
pub use context::RenderContext;
pub use error::{Error, Result};
pub use gl::Gl;
pub use inputs::{BufferInput, Input, InputKind, LoadState, SamplerSettings};
pub use io_resource::{OutputSpec, SwapPolicy};
pub use size::Rsize;
