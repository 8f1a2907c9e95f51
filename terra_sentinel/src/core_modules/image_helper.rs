// Decoding uploads, fixing the working resolution, and encoding overlays for
// transport. Every image entering or leaving the engine passes through here.

use crate::error::{AnalysisError, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::codecs::png::PngEncoder;
use image::imageops::{self, FilterType};
use image::{ExtendedColorType, ImageEncoder, RgbImage};
use std::path::Path;

pub const PNG_DATA_URI_PREFIX: &str = "data:image/png;base64,";

/// Decodes any supported image format and drops alpha or extra channels.
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage> {
    let decoded = image::load_from_memory(bytes)?;
    let rgb = decoded.to_rgb8();
    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(AnalysisError::EmptyImage);
    }
    Ok(rgb)
}

/// Bilinear resize to `size`×`size`, ignoring aspect ratio.
pub fn canonicalize(image: &RgbImage, size: u32) -> RgbImage {
    if image.dimensions() == (size, size) {
        return image.clone();
    }
    imageops::resize(image, size, size, FilterType::Triangle)
}

pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let encoder = PngEncoder::new(&mut buffer);
    encoder
        .write_image(image.as_raw(), image.width(), image.height(), ExtendedColorType::Rgb8)
        .map_err(|e| AnalysisError::ImageEncode(e.to_string()))?;
    Ok(buffer)
}

/// `data:image/png;base64,...` for an encoded PNG.
pub fn png_data_uri(png: &[u8]) -> String {
    format!("{PNG_DATA_URI_PREFIX}{}", STANDARD.encode(png))
}

pub fn save_png(path: impl AsRef<Path>, image: &RgbImage) -> Result<()> {
    let png = encode_png(image)?;
    std::fs::write(path.as_ref(), png)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]))
    }

    #[test]
    fn png_round_trips_pixels() {
        let image = gradient(37, 21);
        let png = encode_png(&image).unwrap();
        assert_eq!(decode_rgb(&png).unwrap(), image);
    }

    #[test]
    fn encoding_is_byte_stable() {
        let image = gradient(64, 64);
        assert_eq!(encode_png(&image).unwrap(), encode_png(&image).unwrap());
    }

    #[test]
    fn canonicalize_ignores_aspect_ratio() {
        let resized = canonicalize(&gradient(120, 40), 50);
        assert_eq!(resized.dimensions(), (50, 50));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(matches!(decode_rgb(b"not an image"), Err(AnalysisError::ImageDecode(_))));
    }

    #[test]
    fn data_uri_has_png_prefix() {
        let uri = png_data_uri(&encode_png(&gradient(4, 4)).unwrap());
        assert!(uri.starts_with(PNG_DATA_URI_PREFIX));
        let payload = &uri[PNG_DATA_URI_PREFIX.len()..];
        assert!(STANDARD.decode(payload).unwrap().starts_with(&[0x89, b'P', b'N', b'G']));
    }

    #[test]
    fn save_png_writes_a_readable_file() {
        let path = std::env::temp_dir().join("terra_sentinel_image_helper_test.png");
        let image = gradient(16, 9);
        save_png(&path, &image).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(decode_rgb(&bytes).unwrap(), image);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn save_png_reports_write_failures_as_io() {
        let path = std::env::temp_dir()
            .join("terra_sentinel_missing_dir")
            .join("nested")
            .join("out.png");
        let result = save_png(&path, &gradient(4, 4));
        assert!(matches!(result, Err(AnalysisError::Io(_))));
    }
}
