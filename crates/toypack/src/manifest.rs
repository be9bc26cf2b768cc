//! Schema of `toy.toml`, the manifest describing a toy's passes and the
//! inputs each pass samples.
//!
//! Types:
//!
//! - `ToyManifest` holds metadata, the context configuration and the ordered
//!   pass list `pack::build_context` turns into a render graph.
//! - `ToyPass` names one pass, its kind, GLSL sources and inputs.
//! - `PassInput` binds an `InputSource` to an `iChannelN` slot or to a named
//!   sampler, with optional sampling overrides.
//!
//! Functions:
//!
//! - `ToyManifest::validate` returns human-readable issues so loaders can
//!   report every misconfiguration at once without panicking.
use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use toyrender::gl::{Filter, Wrap};
use toyrender::{ContextConfig, DefineEntry, Rsize, SwapPolicy};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ToyManifest {
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub passes: Vec<ToyPass>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ToyPass {
    pub name: String,
    #[serde(default)]
    pub kind: PassKind,
    /// Fragment sources, concatenated in order.
    pub sources: Vec<PathBuf>,
    /// Vertex sources of a geometry pass.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vertex: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swap_policy: Option<SwapPolicy>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub defines: Vec<DefineEntry>,
    #[serde(default)]
    pub inputs: Vec<PassInput>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PassKind {
    #[default]
    Toy,
    Geometry,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PassInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampler: Option<String>,
    #[serde(flatten)]
    pub source: InputSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vflip: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrap: Option<Wrap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_filter: Option<Filter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mag_filter: Option<Filter>,
}

impl PassInput {
    /// Uniform name the input binds to: `iChannelN` or the sampler name.
    pub fn binding_name(&self) -> Option<String> {
        match (&self.sampler, self.channel) {
            (Some(sampler), None) => Some(sampler.clone()),
            (None, Some(channel)) => Some(format!("iChannel{channel}")),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InputSource {
    Buffer {
        name: String,
        /// Output of the referenced pass to sample; its first output when unset.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<String>,
    },
    Texture {
        path: PathBuf,
    },
    Noise {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        size: Option<Rsize>,
        #[serde(default)]
        seed: u64,
    },
    Checker {
        size: Rsize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tile: Option<u32>,
    },
}

impl ToyManifest {
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn pass(&self, name: &str) -> Option<&ToyPass> {
        self.passes.iter().find(|pass| pass.name == name)
    }

    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.passes.is_empty() {
            issues.push("manifest must declare at least one pass".to_string());
        }
        if let Err(error) = self.context.validate() {
            issues.push(format!("context: {error}"));
        }

        let mut seen = HashSet::new();
        for pass in &self.passes {
            if !seen.insert(pass.name.as_str()) {
                issues.push(format!("pass '{}' is declared more than once", pass.name));
            }
            if pass.sources.is_empty() {
                issues.push(format!("pass '{}' lists no sources", pass.name));
            }
            match pass.kind {
                PassKind::Geometry => {
                    if pass.vertex.is_empty() {
                        issues.push(format!(
                            "geometry pass '{}' lists no vertex sources",
                            pass.name
                        ));
                    }
                    if !pass.inputs.is_empty() {
                        issues.push(format!(
                            "geometry pass '{}' cannot take inputs",
                            pass.name
                        ));
                    }
                    if !pass.defines.is_empty() {
                        issues.push(format!(
                            "geometry pass '{}' compiles its sources verbatim and takes no defines",
                            pass.name
                        ));
                    }
                }
                PassKind::Toy => {
                    if !pass.vertex.is_empty() {
                        issues.push(format!(
                            "toy pass '{}' uses the built-in vertex stage; remove `vertex`",
                            pass.name
                        ));
                    }
                }
            }

            let mut bound = HashSet::new();
            for input in &pass.inputs {
                match (input.channel, &input.sampler) {
                    (Some(_), Some(_)) | (None, None) => issues.push(format!(
                        "pass '{}' has an input that must set exactly one of `channel` or `sampler`",
                        pass.name
                    )),
                    (Some(channel), None) if channel > 3 => issues.push(format!(
                        "pass '{}' uses channel {} which exceeds Shadertoy limit",
                        pass.name, channel
                    )),
                    _ => {}
                }
                if let Some(binding) = input.binding_name() {
                    if !bound.insert(binding.clone()) {
                        issues.push(format!(
                            "pass '{}' binds '{}' more than once",
                            pass.name, binding
                        ));
                    }
                }
                if let InputSource::Buffer { name, .. } = &input.source {
                    if self.pass(name).is_none() {
                        issues.push(format!(
                            "pass '{}' references buffer '{}' which is undefined",
                            pass.name, name
                        ));
                    }
                }
            }
        }
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_PASSES: &str = r#"
name = "Feedback"
tags = ["demo"]

[context]
internal_format = "rgba16f"

[[passes]]
name = "accum"
sources = ["common.glsl", "accum.glsl"]
swap_policy = "double_buffer"
defines = [{ name = "DECAY", value = "0.98" }]

[[passes.inputs]]
channel = 0
type = "buffer"
name = "accum"

[[passes.inputs]]
sampler = "grain"
type = "noise"
seed = 7
min_filter = "linear"

[[passes]]
name = "image"
sources = ["image.glsl"]

[[passes.inputs]]
channel = 0
type = "buffer"
name = "accum"
output = "toy_FragColor"
wrap = "clamp_to_edge"
"#;

    #[test]
    fn parses_passes_and_inputs() {
        let manifest = ToyManifest::from_toml_str(TWO_PASSES).unwrap();
        assert_eq!(manifest.name.as_deref(), Some("Feedback"));
        assert_eq!(manifest.passes.len(), 2);

        let accum = manifest.pass("accum").unwrap();
        assert_eq!(accum.kind, PassKind::Toy);
        assert_eq!(accum.swap_policy, Some(SwapPolicy::DoubleBuffer));
        assert_eq!(accum.defines[0].value.as_deref(), Some("0.98"));
        assert_eq!(accum.inputs[1].binding_name().as_deref(), Some("grain"));
        assert_eq!(
            accum.inputs[1].source,
            InputSource::Noise {
                size: None,
                seed: 7
            }
        );
        assert_eq!(accum.inputs[1].min_filter, Some(Filter::Linear));
        let image = manifest.pass("image").unwrap();
        assert_eq!(image.inputs[0].wrap, Some(Wrap::ClampToEdge));
        assert_eq!(
            image.inputs[0].source,
            InputSource::Buffer {
                name: "accum".into(),
                output: Some("toy_FragColor".into())
            }
        );
        assert!(manifest.validate().is_empty(), "{:?}", manifest.validate());
    }

    #[test]
    fn reports_every_issue() {
        let manifest = ToyManifest::from_toml_str(
            r#"
[[passes]]
name = "a"
sources = ["a.glsl"]

[[passes.inputs]]
channel = 5
type = "buffer"
name = "missing"

[[passes.inputs]]
type = "checker"
size = { width = 8, height = 8 }

[[passes]]
name = "a"
kind = "geometry"
sources = ["frag.glsl"]

[[passes.inputs]]
channel = 0
type = "texture"
path = "t.png"
"#,
        )
        .unwrap();
        let issues = manifest.validate();
        let has = |needle: &str| issues.iter().any(|issue| issue.contains(needle));
        assert!(has("exceeds Shadertoy limit"), "{issues:?}");
        assert!(has("buffer 'missing' which is undefined"), "{issues:?}");
        assert!(has("exactly one of `channel` or `sampler`"), "{issues:?}");
        assert!(has("declared more than once"), "{issues:?}");
        assert!(has("lists no vertex sources"), "{issues:?}");
        assert!(has("cannot take inputs"), "{issues:?}");
    }

    #[test]
    fn empty_manifest_is_invalid() {
        let issues = ToyManifest::default().validate();
        assert_eq!(issues, vec!["manifest must declare at least one pass"]);
    }
}
