use image::imageops::FilterType;

use super::decode::DecodedImage;
use crate::error::Result;

/// Longest side of a generated thumbnail
pub const THUMBNAIL_SIZE: u32 = 256;

/// Target size keeping aspect ratio so the longer side equals `max_side`.
/// Images already within `max_side` on both sides keep their size.
pub fn thumbnail_dimensions(width: u32, height: u32, max_side: u32) -> (u32, u32) {
    if width <= max_side && height <= max_side {
        return (width, height);
    }

    let aspect = width as f64 / height.max(1) as f64;
    if width >= height {
        let h = (max_side as f64 / aspect).round() as u32;
        (max_side, h.max(1))
    } else {
        let w = (max_side as f64 * aspect).round() as u32;
        (w.max(1), max_side)
    }
}

/// Downscale for the thumbnail cache. Small sources are returned unchanged,
/// byte for byte.
pub fn downscale(image: &DecodedImage, max_side: u32) -> Result<DecodedImage> {
    let (width, height) = thumbnail_dimensions(image.width, image.height, max_side);
    if (width, height) == (image.width, image.height) {
        return Ok(image.clone());
    }

    let resized = image
        .to_dynamic()?
        .resize_exact(width, height, FilterType::Lanczos3);
    Ok(DecodedImage::from_dynamic(resized))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thumbnail::decode::PixelFormat;

    fn solid(width: u32, height: u32) -> DecodedImage {
        let len = (width * height * 4) as usize;
        DecodedImage::new(width, height, PixelFormat::Rgba8, vec![200; len]).unwrap()
    }

    #[test]
    fn test_dimensions() {
        assert_eq!(thumbnail_dimensions(1024, 512, 256), (256, 128));
        assert_eq!(thumbnail_dimensions(512, 1024, 256), (128, 256));
        assert_eq!(thumbnail_dimensions(200, 100, 256), (200, 100));
        assert_eq!(thumbnail_dimensions(1000, 300, 256), (256, 77));
        assert_eq!(thumbnail_dimensions(300, 300, 256), (256, 256));
        assert_eq!(thumbnail_dimensions(4000, 1, 256), (256, 1));
    }

    #[test]
    fn test_large_source_is_resized() {
        let thumb = downscale(&solid(1024, 512), THUMBNAIL_SIZE).unwrap();
        assert_eq!((thumb.width, thumb.height), (256, 128));
        assert_eq!(thumb.format, PixelFormat::Rgba8);
        assert_eq!(thumb.byte_len(), 256 * 128 * 4);
    }

    #[test]
    fn test_small_source_is_untouched() {
        let mut source = solid(200, 100);
        source.pixels[7] = 3;
        let thumb = downscale(&source, THUMBNAIL_SIZE).unwrap();
        assert_eq!(thumb, source);
    }
}
