use std::rc::Rc;

use crate::error::Result;
use crate::gl::{
    Filter, Gl, PixelChannels, TexData, TexImage, TexParam, Texture, TextureFormat, TextureTarget,
    Wrap,
};
use crate::size::Rsize;

pub const DEFAULT_TILE_SIZE: u32 = 10;

const ERROR_TEXTURE_SIZE: u32 = 32;
const ERROR_TILE_SIZE: u32 = 16;

fn is_lit(x: u32, y: u32, tile: u32) -> bool {
    let tile = tile.max(1);
    (x / tile + y / tile) % 2 == 0
}

/// Black and white checkerboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckerInput {
    size: Rsize,
    tile: u32,
}

impl CheckerInput {
    pub fn new(size: Rsize, tile: u32) -> Self {
        Self { size, tile }
    }

    pub fn size(&self) -> Rsize {
        self.size
    }

    pub fn tile(&self) -> u32 {
        self.tile
    }

    pub fn pixels(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity((self.size.width * self.size.height) as usize);
        for y in 0..self.size.height {
            for x in 0..self.size.width {
                data.push(if is_lit(x, y, self.tile) { 255 } else { 0 });
            }
        }
        data
    }

    pub fn load(&self, gl: &Rc<dyn Gl>) -> Result<Texture> {
        let data = self.pixels();
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

/// Magenta and black placeholder bound in place of inputs that failed.
pub fn error_texture(gl: &Rc<dyn Gl>) -> Result<Texture> {
    let mut data = Vec::with_capacity((ERROR_TEXTURE_SIZE * ERROR_TEXTURE_SIZE * 4) as usize);
    for y in 0..ERROR_TEXTURE_SIZE {
        for x in 0..ERROR_TEXTURE_SIZE {
            let texel = if is_lit(x, y, ERROR_TILE_SIZE) {
                [255, 0, 255, 255]
            } else {
                [0, 0, 0, 255]
            };
            data.extend_from_slice(&texel);
        }
    }

    let texture = Texture::new(gl, TextureTarget::Texture2d)?;
    texture.image_2d(&TexImage {
        target: TextureTarget::Texture2d,
        width: ERROR_TEXTURE_SIZE,
        height: ERROR_TEXTURE_SIZE,
        format: TextureFormat::Rgba8,
        channels: PixelChannels::Rgba,
        data: Some(TexData::U8(&data)),
    })?;
    texture.parameter(TexParam::MinFilter(Filter::Nearest))?;
    texture.parameter(TexParam::MagFilter(Filter::Nearest))?;
    texture.parameter(TexParam::WrapS(Wrap::Repeat))?;
    texture.parameter(TexParam::WrapT(Wrap::Repeat))?;
    Ok(texture)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::HeadlessGl;

    #[test]
    fn checker_alternates_tiles() {
        let checker = CheckerInput::new(Rsize::new(4, 2), 2);
        assert_eq!(checker.pixels(), vec![255, 255, 0, 0, 255, 255, 0, 0]);
    }

    #[test]
    fn error_texture_is_magenta_checker() {
        let gl: Rc<dyn Gl> = Rc::new(HeadlessGl::default());
        let texture = error_texture(&gl).unwrap();
        let pixels = texture.read_pixels().unwrap();
        assert_eq!((pixels.width, pixels.height), (32, 32));
        assert_eq!(pixels.pixel(0, 0), Some([1.0, 0.0, 1.0, 1.0]));
        assert_eq!(pixels.pixel(16, 0), Some([0.0, 0.0, 0.0, 1.0]));
        assert_eq!(pixels.pixel(16, 16), Some([1.0, 0.0, 1.0, 1.0]));
    }
}
