// THEORY:
// The vegetation-change detector compares two photos of the same place taken at
// different times and reports how much of the originally green area is gone.
// It needs no model: a pixel counts as vegetation when green clearly dominates
// red, using the normalized index `(G - R) / (G + R + 1e-5) > 0.1`.
//
// Key architectural principles:
// 1.  **Before Defines the Frame**: The `before` image fixes the resolution. An
//     `after` image of another size is bilinearly resized onto it; nothing more
//     elaborate than that is attempted to register the pair.
// 2.  **Loss Is Directional**: Only pixels green before and not green after
//     count. Regrowth is ignored.
// 3.  **Relative Measure**: Loss is a percentage of the original vegetation, so
//     a scene with no vegetation at the start reports 0% rather than failing.

use crate::core_modules::verdict::{Severity, classify_loss};
use crate::error::{AnalysisError, Result};
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use ndarray::Array2;

pub type VegetationMask = Array2<bool>;

const INDEX_EPSILON: f32 = 1e-5;
const VEGETATION_THRESHOLD: f32 = 0.1;
const LOSS_COLOR: [u8; 3] = [255, 0, 0];
const LOSS_ALPHA: f32 = 0.5;

/// Outcome of a before/after vegetation comparison.
#[derive(Debug, Clone)]
pub struct DeforestationResult {
    /// Share of the original vegetation that was lost, in [0, 100], two decimals.
    pub percent_loss: f64,
    pub severity: Severity,
    /// The `after` image with lost vegetation tinted red.
    pub loss_overlay: RgbImage,
    pub vegetation_before_pct: f64,
    pub vegetation_after_pct: f64,
}

/// The green-over-red vegetation index for one pixel.
pub fn vegetation_index(pixel: &Rgb<u8>) -> f32 {
    let r = pixel.0[0] as f32;
    let g = pixel.0[1] as f32;
    (g - r) / (g + r + INDEX_EPSILON)
}

pub fn vegetation_mask(image: &RgbImage) -> VegetationMask {
    let (width, height) = image.dimensions();
    Array2::from_shape_fn((height as usize, width as usize), |(row, col)| {
        vegetation_index(image.get_pixel(col as u32, row as u32)) > VEGETATION_THRESHOLD
    })
}

/// Pixels vegetated in `before` and not in `after`.
pub fn loss_mask(before: &VegetationMask, after: &VegetationMask) -> Result<VegetationMask> {
    if before.dim() != after.dim() {
        return Err(AnalysisError::ShapeMismatch {
            expected: before.dim(),
            actual: after.dim(),
        });
    }
    Ok(ndarray::Zip::from(before).and(after).map_collect(|&b, &a| b && !a))
}

fn round_2dp(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn coverage_pct(mask: &VegetationMask) -> f64 {
    if mask.is_empty() {
        return 0.0;
    }
    let covered = mask.iter().filter(|&&v| v).count();
    round_2dp(100.0 * covered as f64 / mask.len() as f64)
}

/// `100 * lost / vegetated_before`, rounded to two decimals; 0 with no baseline.
pub fn percent_loss(before: &VegetationMask, loss: &VegetationMask) -> f64 {
    let baseline = before.iter().filter(|&&v| v).count();
    if baseline == 0 {
        return 0.0;
    }
    let lost = loss.iter().filter(|&&v| v).count();
    round_2dp(100.0 * lost as f64 / baseline as f64)
}

/// Blends pure red at half strength onto every loss pixel of `after`.
pub fn loss_overlay(after: &RgbImage, loss: &VegetationMask) -> RgbImage {
    let mut overlay = after.clone();
    for (x, y, pixel) in overlay.enumerate_pixels_mut() {
        if loss[[y as usize, x as usize]] {
            let blended: [u8; 3] = std::array::from_fn(|c| {
                (LOSS_ALPHA * LOSS_COLOR[c] as f32 + (1.0 - LOSS_ALPHA) * pixel.0[c] as f32) as u8
            });
            *pixel = Rgb(blended);
        }
    }
    overlay
}

/// Compares a before/after pair and quantifies vegetation loss.
pub fn analyze_deforestation(before: &RgbImage, after: &RgbImage) -> Result<DeforestationResult> {
    if before.width() == 0 || before.height() == 0 || after.width() == 0 || after.height() == 0 {
        return Err(AnalysisError::EmptyImage);
    }

    let resized;
    let after = if after.dimensions() != before.dimensions() {
        tracing::debug!(
            before = ?before.dimensions(),
            after = ?after.dimensions(),
            "resizing after image onto before frame"
        );
        resized = imageops::resize(after, before.width(), before.height(), FilterType::Triangle);
        &resized
    } else {
        after
    };

    let mask_before = vegetation_mask(before);
    let mask_after = vegetation_mask(after);
    let loss = loss_mask(&mask_before, &mask_after)?;

    let percent_loss = percent_loss(&mask_before, &loss);
    let severity = classify_loss(percent_loss);

    Ok(DeforestationResult {
        percent_loss,
        severity,
        loss_overlay: loss_overlay(after, &loss),
        vegetation_before_pct: coverage_pct(&mask_before),
        vegetation_after_pct: coverage_pct(&mask_after),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const GREEN: Rgb<u8> = Rgb([20, 200, 20]);
    const SOIL: Rgb<u8> = Rgb([140, 100, 60]);

    /// 10×10 image that is green inside `[x0, x1) × [y0, y1)` and soil elsewhere.
    fn patch(x0: u32, x1: u32, y0: u32, y1: u32) -> RgbImage {
        RgbImage::from_fn(10, 10, |x, y| {
            if (x0..x1).contains(&x) && (y0..y1).contains(&y) { GREEN } else { SOIL }
        })
    }

    #[test]
    fn index_separates_green_from_soil() {
        assert!(vegetation_index(&GREEN) > VEGETATION_THRESHOLD);
        assert!(vegetation_index(&SOIL) <= VEGETATION_THRESHOLD);
        assert_eq!(vegetation_index(&Rgb([0, 0, 0])), 0.0);
    }

    #[test]
    fn partial_overlap_loses_three_quarters() {
        // 4×4 patch before; after keeps only a 2×2 corner of it.
        let before = patch(0, 4, 0, 4);
        let after = patch(0, 2, 0, 2);
        let result = analyze_deforestation(&before, &after).unwrap();
        assert_eq!(result.percent_loss, 75.0);
        assert_eq!(result.severity, Severity::Critical);
        assert_eq!(result.vegetation_before_pct, 16.0);
        assert_eq!(result.vegetation_after_pct, 4.0);
    }

    #[test]
    fn disjoint_patches_lose_everything() {
        let before = patch(0, 4, 0, 4);
        let after = patch(6, 10, 6, 10);
        let result = analyze_deforestation(&before, &after).unwrap();
        assert_eq!(result.percent_loss, 100.0);
    }

    #[test]
    fn no_baseline_vegetation_reports_zero() {
        let before = RgbImage::from_pixel(10, 10, SOIL);
        let after = patch(0, 10, 0, 10);
        let result = analyze_deforestation(&before, &after).unwrap();
        assert_eq!(result.percent_loss, 0.0);
        assert_eq!(result.severity, Severity::Low);
    }

    #[test]
    fn identical_images_report_no_loss_and_clean_overlay() {
        let image = patch(2, 8, 2, 8);
        let result = analyze_deforestation(&image, &image).unwrap();
        assert_eq!(result.percent_loss, 0.0);
        assert_eq!(result.loss_overlay, image);
    }

    #[test]
    fn overlay_tints_only_lost_pixels() {
        let before = patch(0, 4, 0, 4);
        let after = RgbImage::from_pixel(10, 10, SOIL);
        let result = analyze_deforestation(&before, &after).unwrap();
        assert_eq!(*result.loss_overlay.get_pixel(1, 1), Rgb([197, 50, 30]));
        assert_eq!(*result.loss_overlay.get_pixel(8, 8), SOIL);
    }

    #[test]
    fn after_is_resized_onto_before() {
        let before = patch(0, 10, 0, 10);
        let after = RgbImage::from_pixel(25, 7, SOIL);
        let result = analyze_deforestation(&before, &after).unwrap();
        assert_eq!(result.loss_overlay.dimensions(), (10, 10));
        assert_eq!(result.percent_loss, 100.0);
    }

    #[test]
    fn percent_is_rounded_to_two_decimals() {
        let before = VegetationMask::from_elem((1, 3), true);
        let mut loss = VegetationMask::from_elem((1, 3), false);
        loss[[0, 0]] = true;
        assert_eq!(percent_loss(&before, &loss), 33.33);
    }

    #[test]
    fn empty_images_are_rejected() {
        let empty = RgbImage::new(0, 0);
        assert!(analyze_deforestation(&empty, &patch(0, 1, 0, 1)).is_err());
    }
}
