// THEORY:
// The `raster` module holds the single-channel float grid every analyzer passes
// around. Texture magnitude, activation maps, and the fusion mask are all plain
// `Array2<f32>` indexed `[[row, col]]`; this module owns the few whole-grid
// operations they share.
//
// Key architectural principles:
// 1.  **No Broadcasting**: Element-wise combination only ever happens between
//     grids of identical shape. `ensure_shape` is the gate, and it fails loudly.
// 2.  **Explicit Resampling**: Maps produced at a foreign resolution (a model's
//     coarse activation grid) are brought to the working resolution with a
//     pixel-center-aligned bilinear resize before they meet anything else.
// 3.  **Guarded Normalization**: Normalizing by the max never divides by zero;
//     an all-zero map stays all-zero.

use crate::error::{AnalysisError, Result};
use ndarray::Array2;

pub type FloatMap = Array2<f32>;

/// Small offset added to a map's max before normalizing by it.
pub const NORMALIZE_EPSILON: f32 = 1e-7;

/// Fails with `ShapeMismatch` unless `map` is exactly `expected` (rows, cols).
pub fn ensure_shape(map: &FloatMap, expected: (usize, usize)) -> Result<()> {
    let actual = map.dim();
    if actual != expected {
        return Err(AnalysisError::ShapeMismatch { expected, actual });
    }
    Ok(())
}

/// Bilinear resize with pixel centers aligned (`src = (dst + 0.5) * scale - 0.5`),
/// clamping at the borders.
pub fn resize_bilinear(map: &FloatMap, rows: usize, cols: usize) -> FloatMap {
    let (src_rows, src_cols) = map.dim();
    if (src_rows, src_cols) == (rows, cols) {
        return map.clone();
    }
    if src_rows == 0 || src_cols == 0 {
        return FloatMap::zeros((rows, cols));
    }

    let col_taps = bilinear_taps(src_cols, cols);
    let row_taps = bilinear_taps(src_rows, rows);

    let mut out = FloatMap::zeros((rows, cols));
    for (row, &(r0, r1, fy)) in row_taps.iter().enumerate() {
        for (col, &(c0, c1, fx)) in col_taps.iter().enumerate() {
            let top = map[[r0, c0]] * (1.0 - fx) + map[[r0, c1]] * fx;
            let bottom = map[[r1, c0]] * (1.0 - fx) + map[[r1, c1]] * fx;
            out[[row, col]] = top * (1.0 - fy) + bottom * fy;
        }
    }
    out
}

/// Precomputes, for each destination index, the two source indices and the
/// interpolation weight of the second.
fn bilinear_taps(src_len: usize, dst_len: usize) -> Vec<(usize, usize, f32)> {
    let scale = src_len as f64 / dst_len as f64;
    (0..dst_len)
        .map(|dst| {
            let position = (dst as f64 + 0.5) * scale - 0.5;
            let mut lower = position.floor();
            let mut fraction = position - lower;
            if lower < 0.0 {
                lower = 0.0;
                fraction = 0.0;
            }
            let mut lower = lower as usize;
            if lower >= src_len - 1 {
                lower = src_len - 1;
                fraction = 0.0;
            }
            let upper = (lower + 1).min(src_len - 1);
            (lower, upper, fraction as f32)
        })
        .collect()
}

/// Maximum finite value of the map, or 0.0 for an empty or all-NaN map.
pub fn max_value(map: &FloatMap) -> f32 {
    map.iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<f32>, v| Some(acc.map_or(v, |m| m.max(v))))
        .unwrap_or(0.0)
}

/// Divides every cell by `max + NORMALIZE_EPSILON` when the max is positive;
/// otherwise returns the map unchanged.
pub fn normalize_by_max(map: &FloatMap) -> FloatMap {
    let max = max_value(map);
    if max > 0.0 {
        let denom = max + NORMALIZE_EPSILON;
        map.mapv(|v| v / denom)
    } else {
        map.clone()
    }
}

/// Population mean and standard deviation, accumulated in f64.
pub fn mean_and_std(map: &FloatMap) -> (f64, f64) {
    let count = map.len();
    if count == 0 {
        return (0.0, 0.0);
    }
    let sum: f64 = map.iter().map(|&v| v as f64).sum();
    let mean = sum / count as f64;
    let variance = map
        .iter()
        .map(|&v| (v as f64 - mean).powi(2))
        .sum::<f64>()
        / count as f64;
    (mean, variance.sqrt())
}

/// Mirror index for a border that reflects without repeating the edge
/// (`dcb|abcd|cba`). Handles offsets larger than the axis itself.
pub fn reflect_101(index: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let period = 2 * (len as isize - 1);
    let wrapped = index.rem_euclid(period);
    if wrapped >= len as isize {
        (period - wrapped) as usize
    } else {
        wrapped as usize
    }
}
