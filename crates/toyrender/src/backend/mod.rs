//! Implementations of the [`Gl`](crate::gl::Gl) trait.
#[cfg(feature = "glow")]
pub mod glow;
pub mod glsl;
pub mod headless;
