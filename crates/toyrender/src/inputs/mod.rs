//! Textures consumed by buffers.
//!
//! An [`Input`] wraps one [`InputKind`] together with the sampler settings
//! used to read it and its load state. File and procedural inputs load once
//! (`Unloaded` -> `Loading` -> `Ready` or `Failed`); buffer inputs resolve
//! every frame to the readable texture of the member they reference. Any
//! input that cannot produce a texture resolves to the context's error
//! texture instead, so one broken input never stops the frame.
use std::path::PathBuf;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::gl::{Filter, Gl, GlslType, Sampler, TexParam, Texture, Wrap};
use crate::size::Rsize;

pub mod buffer;
pub mod checker;
pub mod image;
pub mod noise;

pub use buffer::{BufferInput, OutputSelector};
pub use checker::{error_texture, CheckerInput, DEFAULT_TILE_SIZE};
pub use image::{
    decoder_for, DecodedImage, ExrDecoder, GenericDecoder, ImageDecoder, ImageInput, ImagePixels,
    JpegDecoder,
};
pub use noise::{NoiseGenerator, NoiseInput, UniformNoise, DEFAULT_NOISE_SIZE};

/// Number of `iChannelN` samplers every toy program declares.
pub const CHANNEL_COUNT: usize = 4;

/// Filtering and wrapping used when an input is sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerSettings {
    pub min_filter: Filter,
    pub mag_filter: Filter,
    pub wrap: Wrap,
}

impl SamplerSettings {
    fn params(&self) -> [TexParam; 4] {
        [
            TexParam::MinFilter(self.min_filter),
            TexParam::MagFilter(self.mag_filter),
            TexParam::WrapS(self.wrap),
            TexParam::WrapT(self.wrap),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Unloaded,
    Loading,
    Ready,
    Failed(String),
}

#[derive(Debug, Clone)]
pub enum InputKind {
    Buffer(BufferInput),
    Image(ImageInput),
    Noise(NoiseInput),
    Checker(CheckerInput),
    /// Always the error texture.
    Error,
}

impl InputKind {
    fn describe(&self) -> String {
        match self {
            InputKind::Buffer(input) => format!("buffer {}", input.name()),
            InputKind::Image(input) => format!("image {}", input.path().display()),
            InputKind::Noise(input) => format!("noise {}", input.size()),
            InputKind::Checker(input) => format!("checker {}", input.size()),
            InputKind::Error => "error".to_string(),
        }
    }
}

/// A texture source with its sampling state.
#[derive(Debug)]
pub struct Input {
    kind: InputKind,
    settings: SamplerSettings,
    state: LoadState,
    texture: Option<Rc<Texture>>,
    sampler: Option<Sampler>,
}

impl Input {
    pub fn new(kind: InputKind) -> Self {
        Self {
            kind,
            settings: SamplerSettings::default(),
            state: LoadState::Unloaded,
            texture: None,
            sampler: None,
        }
    }

    pub fn buffer(input: BufferInput) -> Self {
        Self::new(InputKind::Buffer(input))
    }

    pub fn image(path: impl Into<PathBuf>) -> Self {
        Self::new(InputKind::Image(ImageInput::new(path)))
    }

    pub fn noise(size: Rsize, seed: u64) -> Self {
        Self::new(InputKind::Noise(NoiseInput::new(size, seed)))
    }

    pub fn checker(size: Rsize, tile: u32) -> Self {
        Self::new(InputKind::Checker(CheckerInput::new(size, tile)))
    }

    pub fn error() -> Self {
        Self::new(InputKind::Error)
    }

    pub fn with_settings(mut self, settings: SamplerSettings) -> Self {
        self.set_settings(settings);
        self
    }

    pub fn with_min_filter(mut self, filter: Filter) -> Self {
        self.settings.min_filter = filter;
        self.sampler = None;
        self
    }

    pub fn with_mag_filter(mut self, filter: Filter) -> Self {
        self.settings.mag_filter = filter;
        self.sampler = None;
        self
    }

    pub fn with_wrap(mut self, wrap: Wrap) -> Self {
        self.settings.wrap = wrap;
        self.sampler = None;
        self
    }

    pub fn kind(&self) -> &InputKind {
        &self.kind
    }

    pub fn settings(&self) -> SamplerSettings {
        self.settings
    }

    pub fn set_settings(&mut self, settings: SamplerSettings) {
        self.settings = settings;
        self.sampler = None;
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    /// Sampler type declared for this input in generated source.
    pub fn declaration_type(&self) -> GlslType {
        GlslType::Sampler2D
    }

    /// Size of the texture this input currently provides, if known.
    pub fn size(&self) -> Option<Rsize> {
        let texture = match &self.kind {
            InputKind::Buffer(input) => input.texture().ok(),
            _ => self.texture.clone(),
        }?;
        let (width, height) = texture.size().ok()?;
        Some(Rsize::new(width, height))
    }

    /// Forgets a loaded texture; the next `resolve` loads again.
    pub fn reset(&mut self) {
        self.state = LoadState::Unloaded;
        self.texture = None;
    }

    /// Loads the texture of a file or procedural input.
    pub fn load(&mut self, gl: &Rc<dyn Gl>) -> Result<()> {
        self.state = LoadState::Loading;
        let loaded = match &self.kind {
            InputKind::Image(input) => input.load(gl).map(Some),
            InputKind::Noise(input) => input.load(gl).map(Some),
            InputKind::Checker(input) => input.load(gl).map(Some),
            InputKind::Buffer(_) | InputKind::Error => Ok(None),
        };
        let configured = loaded.and_then(|texture| {
            if let Some(texture) = &texture {
                self.configure(texture)?;
            }
            Ok(texture)
        });
        match configured {
            Ok(texture) => {
                self.texture = texture.map(Rc::new);
                self.state = LoadState::Ready;
                Ok(())
            }
            Err(error) => {
                self.state = LoadState::Failed(error.to_string());
                Err(error)
            }
        }
    }

    fn configure(&self, texture: &Texture) -> Result<()> {
        for param in self.settings.params() {
            texture.parameter(param)?;
        }
        if self.settings.min_filter.uses_mipmaps() {
            texture.generate_mipmap()?;
        }
        Ok(())
    }

    /// Sampler object carrying this input's settings, created on first use.
    pub fn sampler(&mut self, gl: &Rc<dyn Gl>) -> Result<&Sampler> {
        if self.sampler.is_none() {
            let sampler = Sampler::new(gl, ())?;
            for param in self.settings.params() {
                sampler.parameter(param)?;
            }
            self.sampler = Some(sampler);
        }
        self.sampler
            .as_ref()
            .ok_or(Error::InvalidState("sampler missing after creation"))
    }

    /// The sampler object, if `sampler` created one.
    pub fn cached_sampler(&self) -> Option<&Sampler> {
        self.sampler.as_ref()
    }

    /// The texture to bind this frame.
    ///
    /// Falls back to `error` when the input cannot provide one; only
    /// systemic failures are returned.
    pub fn resolve(&mut self, gl: &Rc<dyn Gl>, error: &Rc<Texture>) -> Result<Rc<Texture>> {
        match &self.kind {
            InputKind::Error => Ok(Rc::clone(error)),
            InputKind::Buffer(input) => match input.texture() {
                Ok(texture) => {
                    if self.settings.min_filter.uses_mipmaps() {
                        texture.generate_mipmap()?;
                    }
                    self.state = LoadState::Ready;
                    Ok(texture)
                }
                Err(failure) => {
                    let failure = Error::from(failure);
                    if failure.is_systemic() {
                        return Err(failure);
                    }
                    if !matches!(self.state, LoadState::Failed(_)) {
                        tracing::warn!(
                            buffer = input.name(),
                            error = %failure,
                            "buffer input unavailable; using error texture"
                        );
                    }
                    self.state = LoadState::Failed(failure.to_string());
                    Ok(Rc::clone(error))
                }
            },
            _ => {
                if self.state == LoadState::Unloaded {
                    if let Err(failure) = self.load(gl) {
                        if failure.is_systemic() {
                            return Err(failure);
                        }
                        tracing::warn!(
                            input = %self.kind.describe(),
                            error = %failure,
                            "failed to load input; using error texture"
                        );
                    }
                }
                Ok(self
                    .texture
                    .as_ref()
                    .map(Rc::clone)
                    .unwrap_or_else(|| Rc::clone(error)))
            }
        }
    }
}

impl From<InputKind> for Input {
    fn from(kind: InputKind) -> Self {
        Self::new(kind)
    }
}

impl From<ImageInput> for Input {
    fn from(input: ImageInput) -> Self {
        Self::new(InputKind::Image(input))
    }
}

impl From<BufferInput> for Input {
    fn from(input: BufferInput) -> Self {
        Self::buffer(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::HeadlessGl;

    fn setup() -> (Rc<dyn Gl>, Rc<Texture>) {
        let gl: Rc<dyn Gl> = Rc::new(HeadlessGl::default());
        let error = Rc::new(error_texture(&gl).unwrap());
        (gl, error)
    }

    #[test]
    fn missing_image_resolves_to_error_texture() {
        let (gl, error) = setup();
        let mut input = Input::image("/nonexistent/texture.png");
        let texture = input.resolve(&gl, &error).unwrap();
        assert!(Rc::ptr_eq(&texture, &error));
        assert!(matches!(input.state(), LoadState::Failed(_)));
    }

    #[test]
    fn procedural_input_loads_once() {
        let (gl, error) = setup();
        let mut input = Input::checker(Rsize::new(8, 8), DEFAULT_TILE_SIZE);
        let first = input.resolve(&gl, &error).unwrap();
        let second = input.resolve(&gl, &error).unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(input.state(), &LoadState::Ready);
        assert_eq!(input.size(), Some(Rsize::new(8, 8)));

        input.reset();
        assert_eq!(input.state(), &LoadState::Unloaded);
        let reloaded = input.resolve(&gl, &error).unwrap();
        assert!(!Rc::ptr_eq(&first, &reloaded));
    }

    #[test]
    fn texture_setup_failure_marks_input_failed() {
        let headless = Rc::new(HeadlessGl::default());
        let gl: Rc<dyn Gl> = headless.clone();
        let error = Rc::new(error_texture(&gl).unwrap());
        headless.fail_next(
            "tex_parameter",
            crate::error::ApiError::Call {
                operation: "tex_parameter",
                code: 0x0500,
            },
        );
        let mut input = Input::checker(Rsize::new(4, 4), DEFAULT_TILE_SIZE);
        let texture = input.resolve(&gl, &error).unwrap();
        assert!(Rc::ptr_eq(&texture, &error));
        assert!(matches!(input.state(), LoadState::Failed(_)));

        input.reset();
        assert!(!Rc::ptr_eq(&input.resolve(&gl, &error).unwrap(), &error));
        assert_eq!(input.state(), &LoadState::Ready);
    }

    #[test]
    fn systemic_failures_propagate() {
        let headless = Rc::new(HeadlessGl::default());
        let gl: Rc<dyn Gl> = headless.clone();
        let error = Rc::new(error_texture(&gl).unwrap());
        headless.fail_next("create_textures", crate::error::ApiError::ContextLost);
        let mut input = Input::noise(Rsize::new(4, 4), 1);
        assert!(input.resolve(&gl, &error).unwrap_err().is_systemic());
    }
}
