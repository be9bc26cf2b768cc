//! Render context settings, loadable from TOML.
use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::compiler::PreprocessorDefines;
use crate::gl::TextureFormat;
use crate::size::Rsize;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse context configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid context configuration: {0}")]
    Invalid(String),
}

/// One `#define` added to every program of a context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefineEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Fixed render size; `None` follows the window.
    pub render_size: Option<Rsize>,
    pub internal_format: TextureFormat,
    /// Appended in order to the built-in defines.
    pub defines: Vec<DefineEntry>,
    /// Draw buffers that fail to build with the error program instead of failing.
    pub substitute_error_program: bool,
    /// Blit the last buffer to the default framebuffer every frame.
    pub present_to_screen: bool,
    /// Reported as `iFrameRate` instead of the measured rate.
    pub target_framerate: Option<f32>,
    /// Trace the assembled source of every compiled program.
    pub log_sources: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            render_size: None,
            internal_format: TextureFormat::Rgba32f,
            defines: Vec::new(),
            substitute_error_program: true,
            present_to_screen: true,
            target_framerate: None,
            log_sources: false,
        }
    }
}

impl ContextConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(size) = self.render_size {
            if size.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "render_size {size} must be non-zero"
                )));
            }
        }
        let mut seen = HashSet::new();
        for define in &self.defines {
            if define.name.trim().is_empty() {
                return Err(ConfigError::Invalid("define with an empty name".into()));
            }
            if !seen.insert(define.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "define {} is listed twice",
                    define.name
                )));
            }
        }
        if let Some(rate) = self.target_framerate {
            if !(rate.is_finite() && rate > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "target_framerate must be positive, got {rate}"
                )));
            }
        }
        Ok(())
    }

    /// The configured defines in declaration order.
    pub fn preprocessor_defines(&self) -> PreprocessorDefines {
        let mut defines = PreprocessorDefines::new();
        for entry in &self.defines {
            defines.set(entry.name.clone(), entry.value.clone());
        }
        defines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_toml_with_defaults() {
        let config = ContextConfig::from_toml_str(
            r#"
            internal_format = "rgba8"
            render_size = { width = 320, height = 200 }

            [[defines]]
            name = "QUALITY"
            value = "2"

            [[defines]]
            name = "FAST"
            "#,
        )
        .unwrap();
        assert_eq!(config.internal_format, TextureFormat::Rgba8);
        assert_eq!(config.render_size, Some(Rsize::new(320, 200)));
        assert!(config.present_to_screen);
        assert_eq!(
            config.preprocessor_defines().to_source(),
            "#define QUALITY 2\n#define FAST\n"
        );
    }

    #[test]
    fn rejects_duplicate_defines_and_empty_sizes() {
        let err = ContextConfig::from_toml_str(
            "[[defines]]\nname = \"A\"\n[[defines]]\nname = \"A\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = ContextConfig::from_toml_str("render_size = { width = 0, height = 4 }")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        assert!(matches!(
            ContextConfig::from_toml_str("present_to_screen = 3"),
            Err(ConfigError::Parse(_))
        ));
    }
}
