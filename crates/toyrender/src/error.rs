//! Error taxonomy shared by every layer of the renderer.
//!
//! Types:
//!
//! - `NullResourceError` is raised when a released or never-created handle is
//!   used; the `ResourceType` tag tells which kind of object it was.
//! - `ApiError` wraps failures reported by the graphics backend.
//! - `ShaderError` separates compile, link and validate failures so callers can
//!   tell syntax problems from interface mismatches and driver checks.
//! - `TemplateError` covers shader template composition and parsing.
//! - `InputError` covers texture inputs that could not be resolved.
//! - `Error` is the crate-level union returned by context and buffer methods;
//!   configuration problems arrive as `config::ConfigError`.
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::gl::{GlslType, ShaderStage};

/// Identifies the kind of graphics object behind a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Buffer,
    Framebuffer,
    Program,
    Query,
    Renderbuffer,
    Sampler,
    Shader,
    Texture,
    VertexArray,
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceType::Buffer => "buffer",
            ResourceType::Framebuffer => "framebuffer",
            ResourceType::Program => "program",
            ResourceType::Query => "query",
            ResourceType::Renderbuffer => "renderbuffer",
            ResourceType::Sampler => "sampler",
            ResourceType::Shader => "shader",
            ResourceType::Texture => "texture",
            ResourceType::VertexArray => "vertex array",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("attempt to use a null {kind} object")]
pub struct NullResourceError {
    pub kind: ResourceType,
}

impl NullResourceError {
    pub fn new(kind: ResourceType) -> Self {
        Self { kind }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("{operation} failed with graphics error {code:#06x}")]
    Call { operation: &'static str, code: u32 },

    #[error("graphics context lost")]
    ContextLost,

    #[error("graphics driver out of memory during {0}")]
    OutOfMemory(&'static str),

    #[error("framebuffer incomplete (status {status:#06x})")]
    IncompleteFramebuffer { status: u32 },

    #[error("operation not supported by this backend: {0}")]
    Unsupported(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShaderError {
    #[error("{stage} shader failed to compile in {source_name}{}:\n{log}", .line.map(|l| format!(":{l}")).unwrap_or_default())]
    Compile {
        stage: ShaderStage,
        source_name: String,
        line: Option<u32>,
        log: String,
    },

    #[error("program failed to link:\n{log}")]
    Link { log: String },

    #[error("program failed validation:\n{log}")]
    Validate { log: String },
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("a part named {0} could not be found")]
    PartNotFound(String),

    #[error("a part named {0} already exists")]
    DuplicatePart(String),

    #[error("template part {0} is not specified")]
    Unspecified(String),

    #[error("{source_name}:{line}: unmatched end")]
    UnmatchedEnd { source_name: String, line: usize },

    #[error("{source_name}:{line}: unexpected template slot {slot}")]
    UnexpectedSlot {
        source_name: String,
        line: usize,
        slot: String,
    },

    #[error("{source_name}: unexpected end of file inside part {part}")]
    UnexpectedEof { source_name: String, part: String },

    #[error("no {0} shader template is registered")]
    MissingStage(ShaderStage),

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum InputError {
    #[error("{}: file not found", .0.display())]
    FileNotFound(PathBuf),

    #[error("failed to decode {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("buffer '{0}' is no longer available")]
    BufferUnavailable(String),

    #[error("buffer '{0}' has no readable output yet")]
    BufferNotAllocated(String),

    #[error("buffer '{buffer}' has no output {output}")]
    UnknownOutput { buffer: String, output: String },

    #[error(transparent)]
    Graphics(#[from] ApiError),

    #[error(transparent)]
    Null(#[from] NullResourceError),
}

impl InputError {
    /// Graphics failures that must not be hidden behind the error texture.
    pub fn is_systemic(&self) -> bool {
        matches!(
            self,
            InputError::Graphics(ApiError::ContextLost | ApiError::OutOfMemory(_))
        )
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Null(#[from] NullResourceError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Shader(#[from] ShaderError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error("no buffer named '{0}' in the swap chain")]
    UnknownBuffer(String),

    #[error("a member named '{0}' is already part of the swap chain")]
    DuplicateMember(String),

    #[error("uniform {name} has type {expected:?} and cannot hold this value")]
    UniformType { name: String, expected: GlslType },

    #[error("invalid state: {0}")]
    InvalidState(&'static str),
}

impl Error {
    /// Errors that leave the whole context unusable and must reach the caller.
    pub fn is_systemic(&self) -> bool {
        match self {
            Error::Api(error) => matches!(error, ApiError::ContextLost | ApiError::OutOfMemory(_)),
            Error::Input(error) => error.is_systemic(),
            _ => false,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_error_names_the_kind() {
        let err = NullResourceError::new(ResourceType::VertexArray);
        assert_eq!(err.to_string(), "attempt to use a null vertex array object");
    }

    #[test]
    fn compile_error_includes_line_when_known() {
        let err = ShaderError::Compile {
            stage: ShaderStage::Fragment,
            source_name: "buffer_a.glsl".into(),
            line: Some(12),
            log: "boom".into(),
        };
        assert!(err.to_string().contains("buffer_a.glsl:12"));
    }

    #[test]
    fn only_context_loss_and_oom_are_systemic() {
        assert!(Error::Api(ApiError::ContextLost).is_systemic());
        assert!(Error::Api(ApiError::OutOfMemory("tex_image_2d")).is_systemic());
        assert!(!Error::Api(ApiError::Call {
            operation: "draw_arrays",
            code: 0x0502
        })
        .is_systemic());
        assert!(!Error::Shader(ShaderError::Link { log: String::new() }).is_systemic());
    }
}
