//! Shader source composition.
//!
//! A [`ProgramTemplate`] holds one [`ShaderTemplate`] per stage. Buffers fill
//! the template slots with their own [`Part`]s (defines, input samplers,
//! source files) and hand the result to a [`ShaderCompiler`], which keeps
//! track of where each part starts so driver logs can be mapped back to the
//! file and line that caused them.
pub mod defines;
pub mod part;
pub mod program_template;
pub mod shader_compiler;
pub mod shader_template;

pub use defines::PreprocessorDefines;
pub use part::{InputDeclaration, NamedSource, Part};
pub use program_template::{ProgramTemplate, SHARED_DEFINES};
pub use shader_compiler::{link_program, remap_log, ShaderCompiler};
pub use shader_template::{PartOverrides, ShaderTemplate};
