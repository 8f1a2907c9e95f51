// THEORY:
// The `TextureAnalyzer` is the one analyzer that runs on every site image,
// whatever model is available. It measures how "disturbed" a scene looks
// without knowing anything about what is in it.
//
// Key architectural principles:
// 1.  **Second-Derivative Energy**: Luminance is run through a 3×3 Laplacian and
//     the absolute response kept. Flat fields and smooth gradients give nothing;
//     scattered debris, torn ground and clutter give dense, uneven response.
// 2.  **Chaos Index**: The scene is summarized as the coefficient of variation of
//     that response, `std / (mean + 1.5)`, scaled by 2.2 and capped at 1.0. The
//     `+1.5` keeps near-uniform images from blowing up the ratio; the scale puts
//     typical natural scenes below 0.5 and cluttered scenes near 1.0.
// 3.  **Two Outputs, One Pass**: The per-pixel magnitude map is returned along
//     with the scalar, because the heatmap compositor clusters the same map into
//     its texture evidence.

use crate::core_modules::filters::laplacian_magnitude;
use crate::core_modules::raster::{FloatMap, mean_and_std};
use crate::error::{AnalysisError, Result};
use image::RgbImage;

const CHAOS_DENOMINATOR_OFFSET: f64 = 1.5;
const CHAOS_GAIN: f64 = 2.2;
const CHAOS_CEILING: f64 = 1.0;

/// The texture evidence for a single image.
#[derive(Debug, Clone)]
pub struct TextureAnalysis {
    /// Normalized texture irregularity in [0, 1].
    pub chaos_index: f64,
    /// Absolute Laplacian response at the image's resolution.
    pub magnitude: FloatMap,
}

/// Rec. 601 luma, rounded to the nearest integer level like an 8-bit grey conversion.
pub fn luminance_map(image: &RgbImage) -> FloatMap {
    let (width, height) = image.dimensions();
    let mut gray = FloatMap::zeros((height as usize, width as usize));
    for (x, y, pixel) in image.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
        gray[[y as usize, x as usize]] = luma.round().min(255.0);
    }
    gray
}

/// `min(1, std / (mean + 1.5) * 2.2)` over a magnitude map.
pub fn chaos_index(magnitude: &FloatMap) -> f64 {
    let (mean, std) = mean_and_std(magnitude);
    let raw = std / (mean + CHAOS_DENOMINATOR_OFFSET);
    (raw * CHAOS_GAIN).min(CHAOS_CEILING)
}

/// Runs the full texture analysis. Only an empty image is rejected.
pub fn analyze_texture(image: &RgbImage) -> Result<TextureAnalysis> {
    if image.width() == 0 || image.height() == 0 {
        return Err(AnalysisError::EmptyImage);
    }
    let gray = luminance_map(image);
    let magnitude = laplacian_magnitude(&gray);
    let chaos_index = chaos_index(&magnitude);
    Ok(TextureAnalysis { chaos_index, magnitude })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn noisy_image(size: u32) -> RgbImage {
        RgbImage::from_fn(size, size, |x, y| {
            let v = ((x * 37 + y * 91 + x * y * 13) % 256) as u8;
            Rgb([v, v.wrapping_mul(3), 255 - v])
        })
    }

    #[test]
    fn flat_images_have_zero_chaos() {
        for value in [0u8, 128, 255] {
            let image = RgbImage::from_pixel(32, 32, Rgb([value, value, value]));
            let analysis = analyze_texture(&image).unwrap();
            assert_eq!(analysis.chaos_index, 0.0);
            assert!(analysis.magnitude.iter().all(|&v| v == 0.0));
        }
    }

    #[test]
    fn chaos_is_bounded_for_noisy_input() {
        let analysis = analyze_texture(&noisy_image(48)).unwrap();
        assert!(analysis.chaos_index >= 0.0 && analysis.chaos_index <= 1.0);
        assert!(analysis.chaos_index > 0.0);
    }

    #[test]
    fn magnitude_matches_image_shape() {
        let image = RgbImage::new(40, 24);
        let analysis = analyze_texture(&image).unwrap();
        assert_eq!(analysis.magnitude.dim(), (24, 40));
    }

    #[test]
    fn sparse_high_contrast_edges_saturate_chaos() {
        // A single bright square on black: energy concentrated on a few pixels.
        let sparse = RgbImage::from_fn(64, 64, |x, y| {
            if (28..36).contains(&x) && (28..36).contains(&y) { Rgb([255, 255, 255]) } else { Rgb([0, 0, 0]) }
        });
        let analysis = analyze_texture(&sparse).unwrap();
        assert_eq!(analysis.chaos_index, 1.0);
    }

    #[test]
    fn luminance_uses_rec601_weights() {
        let image = RgbImage::from_pixel(1, 1, Rgb([255, 0, 0]));
        assert_eq!(luminance_map(&image)[[0, 0]], 76.0);
        let image = RgbImage::from_pixel(1, 1, Rgb([0, 255, 0]));
        assert_eq!(luminance_map(&image)[[0, 0]], 150.0);
    }

    #[test]
    fn empty_image_is_rejected() {
        let image = RgbImage::new(0, 0);
        assert!(matches!(analyze_texture(&image), Err(AnalysisError::EmptyImage)));
    }
}
