//! Image resizing used by the thumbnail jobs.

use anyhow::{Context, Result};
use image::imageops::FilterType;
use std::io::Cursor;

/// Pure `resize(bytes, width) -> bytes` primitive.
pub trait Resizer: Send + Sync + 'static {
    fn resize(&self, source: &[u8], width: u32) -> Result<Vec<u8>>;
}

/// Resizer on the `image` crate. Keeps the aspect ratio and re-encodes in
/// the source format.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageResizer;

impl Resizer for ImageResizer {
    fn resize(&self, source: &[u8], width: u32) -> Result<Vec<u8>> {
        let format = image::guess_format(source).context("Unrecognised image format")?;
        let img = image::load_from_memory_with_format(source, format)
            .context("Failed to decode image")?;

        let height = (u64::from(img.height()) * u64::from(width) / u64::from(img.width().max(1)))
            .clamp(1, u64::from(u32::MAX)) as u32;
        let thumbnail = img.resize_exact(width, height, FilterType::Triangle);

        let mut out = Cursor::new(Vec::new());
        thumbnail
            .write_to(&mut out, format)
            .context("Failed to encode thumbnail")?;
        Ok(out.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 90]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_resize_keeps_aspect_ratio() {
        let thumbnail = ImageResizer.resize(&png(40, 20), 100).unwrap();
        let decoded = image::load_from_memory(&thumbnail).unwrap();
        assert_eq!(decoded.width(), 100);
        assert_eq!(decoded.height(), 50);
        assert_eq!(image::guess_format(&thumbnail).unwrap(), ImageFormat::Png);
    }

    #[test]
    fn test_resize_rejects_non_image() {
        assert!(ImageResizer.resize(b"plain text, not pixels", 100).is_err());
    }
}
