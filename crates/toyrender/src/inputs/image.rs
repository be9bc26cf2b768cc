//! Raster decoders for file-backed inputs, built on the `image` crate.
use std::path::{Path, PathBuf};
use std::rc::Rc;

use image::imageops::flip_vertical_in_place;
use image::{DynamicImage, ImageFormat, ImageReader};

use crate::error::{InputError, Result};
use crate::gl::{Gl, PixelChannels, TexData, TexImage, Texture, TextureFormat, TextureTarget};

/// Decoded pixels, rows bottom to top once flipped.
#[derive(Debug, Clone, PartialEq)]
pub enum ImagePixels {
    U8(Vec<u8>),
    F32(Vec<f32>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub channels: PixelChannels,
    pub pixels: ImagePixels,
}

impl DecodedImage {
    /// Texture storage format matching the decoded data.
    pub fn texture_format(&self) -> TextureFormat {
        match (&self.pixels, self.channels) {
            (ImagePixels::F32(_), PixelChannels::Red) => TextureFormat::R32f,
            (ImagePixels::F32(_), _) => TextureFormat::Rgba32f,
            (ImagePixels::U8(_), PixelChannels::Red) => TextureFormat::R8,
            (ImagePixels::U8(_), PixelChannels::Rg) => TextureFormat::Rg8,
            (ImagePixels::U8(_), PixelChannels::Rgb) => TextureFormat::Rgb8,
            (ImagePixels::U8(_), PixelChannels::Rgba) => TextureFormat::Rgba8,
        }
    }

    pub fn upload(&self, gl: &Rc<dyn Gl>) -> Result<Texture> {
        let texture = Texture::new(gl, TextureTarget::Texture2d)?;
        let data = match &self.pixels {
            ImagePixels::U8(bytes) => TexData::U8(bytes),
            ImagePixels::F32(floats) => TexData::F32(floats),
        };
        texture.image_2d(&TexImage {
            target: TextureTarget::Texture2d,
            width: self.width,
            height: self.height,
            format: self.texture_format(),
            channels: self.channels,
            data: Some(data),
        })?;
        Ok(texture)
    }
}

/// Loads a raster file into memory.
pub trait ImageDecoder {
    fn decode(&self, path: &Path, vflip: bool) -> Result<DecodedImage, InputError>;
}

/// OpenEXR images, kept as 32-bit float RGBA.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExrDecoder;

/// JPEG images as 8-bit RGB.
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegDecoder;

/// Any format the `image` crate recognizes from the file contents.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericDecoder;

/// Picks a decoder from the file extension.
pub fn decoder_for(path: &Path) -> Box<dyn ImageDecoder> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("exr") => Box::new(ExrDecoder),
        Some("jpg" | "jpeg") => Box::new(JpegDecoder),
        _ => Box::new(GenericDecoder),
    }
}

fn open(path: &Path, format: Option<ImageFormat>) -> Result<DynamicImage, InputError> {
    if !path.exists() {
        return Err(InputError::FileNotFound(path.to_path_buf()));
    }
    let io_error = |source| InputError::Io {
        path: path.to_path_buf(),
        source,
    };
    let decode_error = |source| InputError::Decode {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = ImageReader::open(path).map_err(io_error)?;
    match format {
        Some(format) => reader.set_format(format),
        None => reader = reader.with_guessed_format().map_err(io_error)?,
    }
    reader.decode().map_err(decode_error)
}

fn rgba_f32(image: DynamicImage, vflip: bool) -> DecodedImage {
    let mut buffer = image.into_rgba32f();
    if vflip {
        flip_vertical_in_place(&mut buffer);
    }
    DecodedImage {
        width: buffer.width(),
        height: buffer.height(),
        channels: PixelChannels::Rgba,
        pixels: ImagePixels::F32(buffer.into_raw()),
    }
}

impl ImageDecoder for ExrDecoder {
    fn decode(&self, path: &Path, vflip: bool) -> Result<DecodedImage, InputError> {
        Ok(rgba_f32(open(path, Some(ImageFormat::OpenExr))?, vflip))
    }
}

impl ImageDecoder for JpegDecoder {
    fn decode(&self, path: &Path, vflip: bool) -> Result<DecodedImage, InputError> {
        let mut buffer = open(path, Some(ImageFormat::Jpeg))?.into_rgb8();
        if vflip {
            flip_vertical_in_place(&mut buffer);
        }
        Ok(DecodedImage {
            width: buffer.width(),
            height: buffer.height(),
            channels: PixelChannels::Rgb,
            pixels: ImagePixels::U8(buffer.into_raw()),
        })
    }
}

impl ImageDecoder for GenericDecoder {
    fn decode(&self, path: &Path, vflip: bool) -> Result<DecodedImage, InputError> {
        let image = open(path, None)?;
        let decoded = match image {
            DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_) => rgba_f32(image, vflip),
            DynamicImage::ImageLuma8(mut buffer) => {
                if vflip {
                    flip_vertical_in_place(&mut buffer);
                }
                DecodedImage {
                    width: buffer.width(),
                    height: buffer.height(),
                    channels: PixelChannels::Red,
                    pixels: ImagePixels::U8(buffer.into_raw()),
                }
            }
            other => {
                let mut buffer = other.into_rgba8();
                if vflip {
                    flip_vertical_in_place(&mut buffer);
                }
                DecodedImage {
                    width: buffer.width(),
                    height: buffer.height(),
                    channels: PixelChannels::Rgba,
                    pixels: ImagePixels::U8(buffer.into_raw()),
                }
            }
        };
        Ok(decoded)
    }
}

/// An input backed by an image file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInput {
    path: PathBuf,
    vflip: bool,
}

impl ImageInput {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            vflip: true,
        }
    }

    /// Whether rows are flipped so the first file row ends up at the top.
    pub fn with_vflip(mut self, vflip: bool) -> Self {
        self.vflip = vflip;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn vflip(&self) -> bool {
        self.vflip
    }

    pub fn load(&self, gl: &Rc<dyn Gl>) -> Result<Texture> {
        let decoded = decoder_for(&self.path).decode(&self.path, self.vflip)?;
        tracing::debug!(
            path = %self.path.display(),
            width = decoded.width,
            height = decoded.height,
            "decoded image input"
        );
        decoded.upload(gl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_png(path: &Path) {
        let mut image = image::RgbaImage::new(2, 2);
        image.put_pixel(0, 0, image::Rgba([255, 0, 0, 255]));
        image.put_pixel(1, 1, image::Rgba([0, 0, 255, 255]));
        image.save(path).unwrap();
    }

    #[test]
    fn generic_decoder_flips_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.png");
        write_png(&path);

        let flipped = GenericDecoder.decode(&path, true).unwrap();
        let ImagePixels::U8(bytes) = &flipped.pixels else {
            panic!("expected 8-bit pixels");
        };
        assert_eq!(flipped.channels, PixelChannels::Rgba);
        // first file row (red at x=0) now last
        assert_eq!(&bytes[8..12], &[255, 0, 0, 255]);

        let upright = GenericDecoder.decode(&path, false).unwrap();
        let ImagePixels::U8(bytes) = &upright.pixels else {
            panic!("expected 8-bit pixels");
        };
        assert_eq!(&bytes[0..4], &[255, 0, 0, 255]);
    }

    #[test]
    fn missing_file_is_reported_before_decoding() {
        let err = decoder_for(Path::new("/nonexistent/tex.jpg"))
            .decode(Path::new("/nonexistent/tex.jpg"), true)
            .unwrap_err();
        assert!(matches!(err, InputError::FileNotFound(_)));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"not a jpeg").unwrap();
        let err = JpegDecoder.decode(&path, false).unwrap_err();
        assert!(matches!(err, InputError::Decode { .. }));
    }
}
