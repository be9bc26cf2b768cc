//! On-disk toy packs: a directory holding `toy.toml` and the GLSL sources and
//! textures it references, loaded into a `toyrender::RenderContext`.
mod manifest;
mod pack;

pub use manifest::{InputSource, PassInput, PassKind, ToyManifest, ToyPass};
pub use pack::{build_context, ensure_glsl_sources, LocalPack, PackError, MANIFEST_FILE};
