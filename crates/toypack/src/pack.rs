//! Wraps a toy pack directory: loads and validates `toy.toml`, resolves
//! source and asset paths against the pack root, and assembles the render
//! graph a `toyrender::RenderContext` draws.
//!
//! Types:
//!
//! - `PackError` classifies manifest parsing, validation and I/O failures.
//! - `LocalPack` stores the resolved root directory and parsed `ToyManifest`.
//!
//! Functions:
//!
//! - `LocalPack::load` reads `toy.toml`, validates it, and returns a
//!   filesystem-backed handle.
//! - `ensure_glsl_sources` confirms every declared source has a file on disk
//!   so later compilation errors point at shader code, not missing files.
//! - `build_context` adds every pass to a fresh context, then wires inputs,
//!   so buffer references resolve regardless of declaration order.
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, Result};
use thiserror::Error;
use toyrender::compiler::PreprocessorDefines;
use toyrender::inputs::{ImageInput, DEFAULT_NOISE_SIZE, DEFAULT_TILE_SIZE};
use toyrender::{BufferSource, GeometryBuffer, Gl, Input, RenderContext, ToyBuffer};

use crate::manifest::{InputSource, PassInput, PassKind, ToyManifest, ToyPass};

/// File name of the manifest at the root of every pack.
pub const MANIFEST_FILE: &str = "toy.toml";

#[derive(Debug, Error)]
pub enum PackError {
    #[error("manifest not found at {0}")]
    ManifestMissing(PathBuf),

    #[error("failed to parse manifest: {0}")]
    ManifestParse(#[from] toml::de::Error),

    #[error("manifest validation failed: {0:?}")]
    ManifestValidation(Vec<String>),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct LocalPack {
    root: PathBuf,
    manifest: ToyManifest,
}

impl LocalPack {
    pub fn load(root: impl AsRef<Path>) -> Result<Self, PackError> {
        let root = root.as_ref().to_path_buf();
        let manifest_path = root.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            return Err(PackError::ManifestMissing(manifest_path));
        }

        let manifest_raw = fs::read_to_string(&manifest_path)?;
        let manifest = ToyManifest::from_toml_str(&manifest_raw)?;
        let issues = manifest.validate();
        if !issues.is_empty() {
            return Err(PackError::ManifestValidation(issues));
        }

        tracing::debug!(
            root = %root.display(),
            passes = manifest.passes.len(),
            "loaded toy pack"
        );
        Ok(Self { root, manifest })
    }

    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    pub fn manifest(&self) -> &ToyManifest {
        &self.manifest
    }

    pub fn passes(&self) -> impl Iterator<Item = &ToyPass> {
        self.manifest.passes.iter()
    }

    /// Every source path of `pass`, vertex sources first, resolved against the root.
    pub fn source_paths(&self, pass: &ToyPass) -> Vec<PathBuf> {
        pass.vertex
            .iter()
            .chain(&pass.sources)
            .map(|path| self.root.join(path))
            .collect()
    }

    pub fn asset_path(&self, source: &InputSource) -> Option<PathBuf> {
        match source {
            InputSource::Texture { path } => Some(self.root.join(path)),
            InputSource::Buffer { .. } | InputSource::Noise { .. } | InputSource::Checker { .. } => {
                None
            }
        }
    }

    fn sources(&self, paths: &[PathBuf]) -> Vec<BufferSource> {
        paths
            .iter()
            .map(|path| BufferSource::File(self.root.join(path)))
            .collect()
    }
}

pub fn ensure_glsl_sources(pack: &LocalPack) -> Result<Vec<PathBuf>, PackError> {
    let mut missing = Vec::new();
    let mut resolved = Vec::new();
    for pass in pack.passes() {
        for source_path in pack.source_paths(pass) {
            if !source_path.exists() {
                missing.push(source_path);
            } else {
                resolved.push(source_path);
            }
        }
    }
    if !missing.is_empty() {
        return Err(PackError::ManifestValidation(
            missing
                .into_iter()
                .map(|p| format!("missing shader source: {}", p.display()))
                .collect(),
        ));
    }
    Ok(resolved)
}

fn pass_defines(pass: &ToyPass) -> PreprocessorDefines {
    let mut defines = PreprocessorDefines::new();
    for entry in &pass.defines {
        defines.set(entry.name.clone(), entry.value.clone());
    }
    defines
}

fn build_input(context: &RenderContext, pack: &LocalPack, input: &PassInput) -> Result<Input> {
    let mut built = match &input.source {
        InputSource::Buffer { name, output } => {
            let buffer = context
                .buffer_input(name)
                .with_context(|| format!("resolving buffer input '{name}'"))?;
            Input::buffer(match output {
                Some(output) => buffer.with_output(output.clone()),
                None => buffer,
            })
        }
        InputSource::Texture { path } => {
            let mut image = ImageInput::new(pack.root().join(path));
            if let Some(vflip) = input.vflip {
                image = image.with_vflip(vflip);
            }
            Input::from(image)
        }
        InputSource::Noise { size, seed } => {
            Input::noise(size.unwrap_or(DEFAULT_NOISE_SIZE), *seed)
        }
        InputSource::Checker { size, tile } => {
            Input::checker(*size, tile.unwrap_or(DEFAULT_TILE_SIZE))
        }
    };
    if let Some(wrap) = input.wrap {
        built = built.with_wrap(wrap);
    }
    if let Some(filter) = input.min_filter {
        built = built.with_min_filter(filter);
    }
    if let Some(filter) = input.mag_filter {
        built = built.with_mag_filter(filter);
    }
    Ok(built)
}

/// Assembles an uninitialized context holding every pass of `pack`.
pub fn build_context(gl: Rc<dyn Gl>, pack: &LocalPack) -> Result<RenderContext> {
    ensure_glsl_sources(pack).context("checking pack sources")?;
    let manifest = pack.manifest();
    let mut context = RenderContext::new(gl, manifest.context.clone())
        .context("creating render context")?;

    for pass in pack.passes() {
        match pass.kind {
            PassKind::Toy => {
                let buffer =
                    ToyBuffer::new(pack.sources(&pass.sources)).with_defines(pass_defines(pass));
                context
                    .add_toy_buffer(&pass.name, buffer)
                    .with_context(|| format!("adding pass '{}'", pass.name))?;
            }
            PassKind::Geometry => {
                let buffer =
                    GeometryBuffer::new(pack.sources(&pass.vertex), pack.sources(&pass.sources));
                context
                    .add_geometry_buffer(&pass.name, buffer)
                    .with_context(|| format!("adding pass '{}'", pass.name))?;
            }
        }
        if pass.swap_policy.is_some() {
            context.set_swap_policy(&pass.name, pass.swap_policy)?;
        }
    }

    for pass in pack.passes() {
        for input in &pass.inputs {
            let Some(binding) = input.binding_name() else {
                continue;
            };
            let built = build_input(&context, pack, input)?;
            context
                .set_input(&pass.name, &binding, built)
                .with_context(|| format!("binding '{binding}' of pass '{}'", pass.name))?;
        }
    }

    tracing::info!(
        name = manifest.name.as_deref().unwrap_or("unnamed"),
        passes = manifest.passes.len(),
        "built toy pack context"
    );
    Ok(context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use toyrender::backend::headless::HeadlessGl;
    use toyrender::buffers::Buffer;
    use toyrender::{Rsize, SwapPolicy};

    fn write_pack(dir: &Path, manifest: &ToyManifest, extra_files: &[(&str, &str)]) {
        let manifest_str = toml::to_string(manifest).expect("serialize manifest");
        fs::write(dir.join(MANIFEST_FILE), manifest_str).expect("write manifest");
        for (path, contents) in extra_files {
            let full_path = dir.join(path);
            if let Some(parent) = full_path.parent() {
                fs::create_dir_all(parent).expect("create dirs");
            }
            fs::write(full_path, contents).expect("write file");
        }
    }

    fn pass(name: &str, source: &str, inputs: Vec<PassInput>) -> ToyPass {
        ToyPass {
            name: name.into(),
            kind: PassKind::Toy,
            sources: vec![PathBuf::from(source)],
            vertex: vec![],
            swap_policy: None,
            defines: vec![],
            inputs,
        }
    }

    fn channel(index: u8, source: InputSource) -> PassInput {
        PassInput {
            channel: Some(index),
            sampler: None,
            source,
            vflip: None,
            wrap: None,
            min_filter: None,
            mag_filter: None,
        }
    }

    // `image` is declared first but reads `trail`, declared after it.
    fn demo_manifest() -> ToyManifest {
        ToyManifest {
            name: Some("Demo".into()),
            passes: vec![
                pass(
                    "image",
                    "image.glsl",
                    vec![channel(
                        0,
                        InputSource::Buffer {
                            name: "trail".into(),
                            output: None,
                        },
                    )],
                ),
                pass(
                    "trail",
                    "trail.glsl",
                    vec![
                        channel(
                            0,
                            InputSource::Buffer {
                                name: "trail".into(),
                                output: None,
                            },
                        ),
                        channel(
                            1,
                            InputSource::Texture {
                                path: PathBuf::from("textures/tex0.png"),
                            },
                        ),
                    ],
                ),
            ],
            ..ToyManifest::default()
        }
    }

    #[test]
    fn loads_valid_pack() {
        let temp = tempfile::tempdir().unwrap();
        let manifest = demo_manifest();
        let extra_files = vec![
            ("image.glsl", "// image"),
            ("trail.glsl", "// trail"),
            ("textures/tex0.png", "fake"),
        ];
        write_pack(temp.path(), &manifest, &extra_files);

        let pack = LocalPack::load(temp.path()).expect("load pack");
        assert_eq!(pack.manifest().name.as_deref(), Some("Demo"));
        assert!(pack
            .asset_path(&InputSource::Texture {
                path: PathBuf::from("textures/tex0.png"),
            })
            .unwrap()
            .exists());
        assert_eq!(ensure_glsl_sources(&pack).expect("sources exist").len(), 2);
    }

    #[test]
    fn detects_missing_manifest_and_sources() {
        let temp = tempfile::tempdir().unwrap();
        assert!(matches!(
            LocalPack::load(temp.path()),
            Err(PackError::ManifestMissing(_))
        ));

        write_pack(temp.path(), &demo_manifest(), &[("image.glsl", "// image")]);
        let pack = LocalPack::load(temp.path()).expect("load pack");
        let err = ensure_glsl_sources(&pack).unwrap_err();
        assert!(matches!(err, PackError::ManifestValidation(ref issues) if issues.len() == 1));
    }

    #[test]
    fn rejects_invalid_manifest() {
        let temp = tempfile::tempdir().unwrap();
        let mut manifest = demo_manifest();
        manifest.passes.remove(1);
        write_pack(temp.path(), &manifest, &[("image.glsl", "// image")]);
        let err = LocalPack::load(temp.path()).unwrap_err();
        assert!(err.to_string().contains("'trail' which is undefined"), "{err}");
    }

    #[test]
    fn builds_graph_in_declaration_order() {
        let temp = tempfile::tempdir().unwrap();
        write_pack(
            temp.path(),
            &demo_manifest(),
            &[
                ("image.glsl", "// image"),
                ("trail.glsl", "// trail"),
                ("textures/tex0.png", "not a png"),
            ],
        );
        let pack = LocalPack::load(temp.path()).unwrap();
        let gl: Rc<dyn Gl> = Rc::new(HeadlessGl::new(Rsize::new(4, 4)));
        let mut context = build_context(gl, &pack).expect("build context");

        let names: Vec<_> = context.chain().members().iter().map(|m| m.name()).collect();
        assert_eq!(names, ["image", "trail"]);
        let trail = context.chain().buffer("trail").unwrap();
        assert_eq!(trail.swap_policy(), SwapPolicy::DoubleBuffer);
        let Buffer::Toy(buffer) = trail.buffer() else {
            panic!("expected a toy buffer");
        };
        assert!(buffer.host().input("iChannel1").is_some());

        context.initialize(Rsize::new(4, 4)).unwrap();
        context.render_frame().expect("undecodable texture falls back");
    }

    #[test]
    fn reports_which_pack_step_failed() {
        let temp = tempfile::tempdir().unwrap();
        write_pack(temp.path(), &demo_manifest(), &[("image.glsl", "// image")]);
        let pack = LocalPack::load(temp.path()).unwrap();
        let gl: Rc<dyn Gl> = Rc::new(HeadlessGl::default());
        let err = build_context(gl, &pack).unwrap_err();
        assert_eq!(err.to_string(), "checking pack sources");
    }
}
