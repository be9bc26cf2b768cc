//! Pieces of shader source assembled by a [`ShaderTemplate`](super::ShaderTemplate).
use std::path::{Path, PathBuf};

use crate::compiler::defines::PreprocessorDefines;
use crate::error::TemplateError;
use crate::gl::GlslType;

/// A block of GLSL text with the name used in diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedSource {
    pub name: String,
    pub source: String,
}

impl NamedSource {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }

    pub fn line_count(&self) -> usize {
        self.source.matches('\n').count()
    }
}

/// One declared sampler of an [`InputPart`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDeclaration {
    pub name: Option<String>,
    pub ty: GlslType,
}

/// A cloneable, named fragment of shader source.
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    /// `#define` lines.
    Define {
        name: String,
        defines: PreprocessorDefines,
    },
    /// Contents of a file on disk, read when the part is serialized.
    File { name: String, path: PathBuf },
    /// Sampler uniforms for a buffer's inputs.
    Input {
        name: String,
        inputs: Vec<InputDeclaration>,
    },
    /// Literal text, or an empty slot waiting to be specified.
    Template { name: String, source: Option<String> },
}

impl Part {
    pub fn define(name: impl Into<String>, defines: PreprocessorDefines) -> Self {
        Part::Define {
            name: name.into(),
            defines,
        }
    }

    pub fn file(name: impl Into<String>, path: impl AsRef<Path>) -> Self {
        Part::File {
            name: name.into(),
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn input(name: impl Into<String>, inputs: Vec<InputDeclaration>) -> Self {
        Part::Input {
            name: name.into(),
            inputs,
        }
    }

    pub fn source(name: impl Into<String>, source: impl Into<String>) -> Self {
        Part::Template {
            name: name.into(),
            source: Some(source.into()),
        }
    }

    pub fn slot(name: impl Into<String>) -> Self {
        Part::Template {
            name: name.into(),
            source: None,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Part::Define { name, .. }
            | Part::File { name, .. }
            | Part::Input { name, .. }
            | Part::Template { name, .. } => name,
        }
    }

    /// Whether the part can produce source text.
    pub fn is_specified(&self) -> bool {
        !matches!(self, Part::Template { source: None, .. })
    }

    pub fn sources(&self) -> Result<Vec<NamedSource>, TemplateError> {
        let mut source = match self {
            Part::Define { defines, .. } => defines.to_source(),
            Part::File { path, .. } => {
                std::fs::read_to_string(path).map_err(|source| TemplateError::Io {
                    path: path.clone(),
                    source,
                })?
            }
            Part::Input { inputs, .. } => inputs
                .iter()
                .map(|input| match &input.name {
                    Some(name) => format!("uniform {} {name};\n", glsl_name(input.ty)),
                    None => format!("/* unnamed {} input */\n", glsl_name(input.ty)),
                })
                .collect(),
            Part::Template {
                source: Some(source),
                ..
            } => source.clone(),
            Part::Template { name, source: None } => {
                return Err(TemplateError::Unspecified(name.clone()))
            }
        };
        // Each part starts on a line of its own.
        if !source.is_empty() && !source.ends_with('\n') {
            source.push('\n');
        }
        Ok(vec![NamedSource::new(self.name(), source)])
    }
}

fn glsl_name(ty: GlslType) -> &'static str {
    match ty {
        GlslType::Sampler3D => "sampler3D",
        GlslType::SamplerCube => "samplerCube",
        _ => "sampler2D",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_part_declares_named_samplers() {
        let part = Part::input(
            "buffer:inputs",
            vec![
                InputDeclaration {
                    name: Some("noise".into()),
                    ty: GlslType::Sampler2D,
                },
                InputDeclaration {
                    name: None,
                    ty: GlslType::Sampler2D,
                },
            ],
        );
        let sources = part.sources().unwrap();
        assert_eq!(
            sources[0].source,
            "uniform sampler2D noise;\n/* unnamed sampler2D input */\n"
        );
    }

    #[test]
    fn file_part_appends_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("common.glsl");
        std::fs::write(&path, "float f() { return 1.0; }").unwrap();
        let sources = Part::file("common", &path).sources().unwrap();
        assert!(sources[0].source.ends_with("}\n"));
    }

    #[test]
    fn inline_part_ends_its_last_line() {
        let sources = Part::source("user.glsl", "#error boom").sources().unwrap();
        assert_eq!(sources[0].source, "#error boom\n");
        assert_eq!(sources[0].line_count(), 1);
        let empty = Part::source("empty", "").sources().unwrap();
        assert_eq!(empty[0].line_count(), 0);
    }

    #[test]
    fn missing_file_is_a_template_error() {
        let err = Part::file("gone", "/nonexistent/gone.glsl")
            .sources()
            .unwrap_err();
        assert!(matches!(err, TemplateError::Io { .. }));
    }

    #[test]
    fn slot_is_unspecified() {
        let err = Part::slot("buffer:sources").sources().unwrap_err();
        assert!(matches!(err, TemplateError::Unspecified(name) if name == "buffer:sources"));
    }
}
