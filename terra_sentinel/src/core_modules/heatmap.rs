// THEORY:
// The heatmap compositor turns the two kinds of spatial evidence into a picture
// a person can read: where the model looked, sharpened or widened by where the
// ground texture is disturbed.
//
// Key architectural principles:
// 1.  **Shape Discipline**: The texture map must come from the same image being
//     painted; a mismatched shape is an error, never broadcast. The activation
//     map may arrive at any resolution and is resampled to the image.
// 2.  **Mode-Specific Spreading**: Ground detections are hard-edged boxes, so in
//     land mode they are dilated and blurred into soft blobs before fusion, and
//     the fused field is blurred once more. Aerial activations are already soft.
// 3.  **Texture Clustering**: Raw Laplacian energy is speckle. It is blurred,
//     binarized at 1.5× its mean, and closed with a 21×21 square so that nearby
//     disturbed patches merge into regions.
// 4.  **Quiet Background**: After a mild gamma, anything below 0.2 is dropped, so
//     weak evidence leaves the original pixels untouched.
// 5.  **Deterministic Output**: Every step is a pure function of its inputs; the
//     same inputs always give the same bytes.

use crate::core_modules::activation::AnalysisMode;
use crate::core_modules::colormap::jet;
use crate::core_modules::filters::{close, dilate, gaussian_blur};
use crate::core_modules::raster::{FloatMap, ensure_shape, mean_and_std, normalize_by_max, resize_bilinear};
use crate::error::{AnalysisError, Result};
use image::{Rgb, RgbImage};

const LAND_DILATE_SIZE: usize = 45;
const LAND_DILATE_ITERATIONS: usize = 2;
const LAND_ACTIVATION_BLUR: usize = 51;
const LAND_FUSION_BLUR: usize = 31;

const TEXTURE_BLUR: usize = 15;
const TEXTURE_THRESHOLD_FACTOR: f64 = 1.5;
const TEXTURE_ON: f32 = 255.0;
const TEXTURE_CLOSE_SIZE: usize = 21;

const FUSION_GAMMA: f32 = 1.1;
const FUSION_FLOOR: f32 = 0.2;
const OVERLAY_ALPHA: f32 = 0.75;

fn image_shape(image: &RgbImage) -> (usize, usize) {
    (image.height() as usize, image.width() as usize)
}

/// Activation evidence at image resolution, normalized to [0, 1].
fn activation_evidence(activation_map: &FloatMap, (rows, cols): (usize, usize), mode: AnalysisMode) -> FloatMap {
    let spread = match mode {
        AnalysisMode::Land => {
            let grown = dilate(activation_map, LAND_DILATE_SIZE, LAND_DILATE_ITERATIONS);
            gaussian_blur(&grown, LAND_ACTIVATION_BLUR)
        }
        AnalysisMode::Satellite => activation_map.clone(),
    };
    normalize_by_max(&resize_bilinear(&spread, rows, cols))
}

/// Clustered texture evidence at image resolution, normalized to [0, 1].
fn texture_evidence(texture_map: &FloatMap, (rows, cols): (usize, usize)) -> FloatMap {
    let blurred = gaussian_blur(texture_map, TEXTURE_BLUR);
    let (mean, _) = mean_and_std(&blurred);
    let threshold = (mean * TEXTURE_THRESHOLD_FACTOR) as f32;
    let binary = blurred.mapv(|v| if v > threshold { TEXTURE_ON } else { 0.0 });
    let clustered = close(&binary, TEXTURE_CLOSE_SIZE);
    normalize_by_max(&resize_bilinear(&clustered, rows, cols))
}

/// The final [0, 1] fusion mask at the image's resolution.
pub fn fusion_mask(
    image: &RgbImage,
    activation_map: &FloatMap,
    texture_map: &FloatMap,
    mode: AnalysisMode,
) -> Result<FloatMap> {
    let shape = image_shape(image);
    if shape.0 == 0 || shape.1 == 0 {
        return Err(AnalysisError::EmptyImage);
    }
    ensure_shape(texture_map, shape)?;

    let cam = activation_evidence(activation_map, shape, mode);
    let tex = texture_evidence(texture_map, shape);

    let fused = match mode {
        AnalysisMode::Land => {
            let mixed = &cam * 0.5 + &tex * 0.5;
            gaussian_blur(&mixed, LAND_FUSION_BLUR)
        }
        AnalysisMode::Satellite => &cam * 0.8 + &(&cam * &tex) * 0.2,
    };

    Ok(fused.mapv(|v| {
        let v = if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
        let v = v.powf(FUSION_GAMMA);
        if v < FUSION_FLOOR { 0.0 } else { v }
    }))
}

/// Paints `mask` over `image` with the jet ramp, using `mask * 0.75` as the
/// per-pixel alpha.
pub fn paint_overlay(image: &RgbImage, mask: &FloatMap) -> Result<RgbImage> {
    ensure_shape(mask, image_shape(image))?;
    let mut overlay = image.clone();
    for (x, y, pixel) in overlay.enumerate_pixels_mut() {
        let strength = mask[[y as usize, x as usize]];
        if strength <= 0.0 {
            continue;
        }
        let color = jet((255.0 * strength) as u8);
        let alpha = strength * OVERLAY_ALPHA;
        let blended: [u8; 3] = std::array::from_fn(|c| {
            (pixel.0[c] as f32 * (1.0 - alpha) + color[c] as f32 * alpha) as u8
        });
        *pixel = Rgb(blended);
    }
    Ok(overlay)
}

/// Renders the anomaly heatmap overlay for one analysis.
pub fn composite_heatmap(
    image: &RgbImage,
    activation_map: &FloatMap,
    texture_map: &FloatMap,
    mode: AnalysisMode,
) -> Result<RgbImage> {
    let mask = fusion_mask(image, activation_map, texture_map, mode)?;
    tracing::debug!(
        mode = %mode,
        lit_pixels = mask.iter().filter(|&&v| v > 0.0).count(),
        "fusion mask composed"
    );
    paint_overlay(image, &mask)
}
