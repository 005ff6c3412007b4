/// Decoded pixel data and the image decode service
///
/// The pipeline treats decoding as an opaque collaborator behind the
/// `ImageDecoder` trait. The default implementation uses the `image` crate.
use image::{DynamicImage, ImageBuffer};
use std::path::Path;

use crate::error::{GalleryError, Result};

/// Layout of the raw pixel bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    L8,
    La8,
    Rgb8,
    Rgba8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::L8 => 1,
            PixelFormat::La8 => 2,
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }

    /// Tag stored in thumbnail records
    pub fn code(self) -> u8 {
        match self {
            PixelFormat::L8 => 1,
            PixelFormat::La8 => 2,
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(PixelFormat::L8),
            2 => Some(PixelFormat::La8),
            3 => Some(PixelFormat::Rgb8),
            4 => Some(PixelFormat::Rgba8),
            _ => None,
        }
    }
}

/// Tightly packed 8-bit pixels, row-major
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    /// Wrap raw bytes, checking the length against the dimensions
    pub fn new(width: u32, height: u32, format: PixelFormat, pixels: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if pixels.len() != expected {
            return Err(GalleryError::UnsupportedFormat(format!(
                "{}x{} {:?} needs {} bytes, got {}",
                width,
                height,
                format,
                expected,
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            format,
            pixels,
        })
    }

    /// Anything that isn't 8-bit L/LA/RGB/RGBA is converted to RGBA8
    pub fn from_dynamic(image: DynamicImage) -> Self {
        let (width, height) = (image.width(), image.height());
        let (format, pixels) = match image {
            DynamicImage::ImageLuma8(buf) => (PixelFormat::L8, buf.into_raw()),
            DynamicImage::ImageLumaA8(buf) => (PixelFormat::La8, buf.into_raw()),
            DynamicImage::ImageRgb8(buf) => (PixelFormat::Rgb8, buf.into_raw()),
            DynamicImage::ImageRgba8(buf) => (PixelFormat::Rgba8, buf.into_raw()),
            other => (PixelFormat::Rgba8, other.into_rgba8().into_raw()),
        };
        Self {
            width,
            height,
            format,
            pixels,
        }
    }

    pub fn to_dynamic(&self) -> Result<DynamicImage> {
        let (w, h, px) = (self.width, self.height, self.pixels.clone());
        let image = match self.format {
            PixelFormat::L8 => ImageBuffer::from_raw(w, h, px).map(DynamicImage::ImageLuma8),
            PixelFormat::La8 => ImageBuffer::from_raw(w, h, px).map(DynamicImage::ImageLumaA8),
            PixelFormat::Rgb8 => ImageBuffer::from_raw(w, h, px).map(DynamicImage::ImageRgb8),
            PixelFormat::Rgba8 => ImageBuffer::from_raw(w, h, px).map(DynamicImage::ImageRgba8),
        };
        image.ok_or_else(|| {
            GalleryError::UnsupportedFormat(format!("pixel buffer does not match {}x{}", w, h))
        })
    }

    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }
}

/// Turns a source path into pixels. Called from worker threads.
pub trait ImageDecoder: Send + Sync {
    fn decode(&self, path: &Path) -> Result<DecodedImage>;
}

/// Decodes anything the `image` crate can open
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageCrateDecoder;

impl ImageDecoder for ImageCrateDecoder {
    fn decode(&self, path: &Path) -> Result<DecodedImage> {
        let image = image::open(path)?;
        Ok(DecodedImage::from_dynamic(image))
    }
}
