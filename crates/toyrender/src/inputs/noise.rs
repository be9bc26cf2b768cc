use std::fmt;
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::Result;
use crate::gl::{Gl, PixelChannels, TexData, TexImage, Texture, TextureFormat, TextureTarget};
use crate::size::Rsize;

/// Produces single-channel noise; equal size and seed must give equal output.
pub trait NoiseGenerator {
    fn generate(&self, size: Rsize, seed: u64) -> Vec<u8>;
}

/// Independent uniformly distributed bytes from a seeded `StdRng`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformNoise;

impl NoiseGenerator for UniformNoise {
    fn generate(&self, size: Rsize, seed: u64) -> Vec<u8> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..size.width as usize * size.height as usize)
            .map(|_| rng.gen::<u8>())
            .collect()
    }
}

pub const DEFAULT_NOISE_SIZE: Rsize = Rsize::new(128, 128);

#[derive(Clone)]
pub struct NoiseInput {
    size: Rsize,
    seed: u64,
    generator: Rc<dyn NoiseGenerator>,
}

impl NoiseInput {
    pub fn new(size: Rsize, seed: u64) -> Self {
        Self {
            size,
            seed,
            generator: Rc::new(UniformNoise),
        }
    }

    pub fn with_generator(mut self, generator: Rc<dyn NoiseGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn size(&self) -> Rsize {
        self.size
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn load(&self, gl: &Rc<dyn Gl>) -> Result<Texture> {
        let data = self.generator.generate(self.size, self.seed);
        let texture = Texture::new(gl, TextureTarget::Texture2d)?;
        texture.image_2d(&TexImage {
            target: TextureTarget::Texture2d,
            width: self.size.width,
            height: self.size.height,
            format: TextureFormat::R8,
            channels: PixelChannels::Red,
            data: Some(TexData::U8(&data)),
        })?;
        Ok(texture)
    }
}

impl Default for NoiseInput {
    fn default() -> Self {
        Self::new(DEFAULT_NOISE_SIZE, 0)
    }
}

impl fmt::Debug for NoiseInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NoiseInput")
            .field("size", &self.size)
            .field("seed", &self.seed)
            .finish_non_exhaustive()
    }
}
