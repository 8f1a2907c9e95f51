// THEORY:
// The `filters` module is the small convolution and morphology toolbox the
// texture analyzer and the heatmap compositor are built from. Everything works
// on `FloatMap`s and is specified by kernel *size* in pixels, because the
// calibration of the compositor (15, 21, 31, 45, 51) was tuned in those terms.
//
// Key architectural principles:
// 1.  **Separable Kernels**: Gaussian blur and square-element morphology are both
//     separable, so each runs as a row pass followed by a column pass. A 51-wide
//     blur costs 102 taps per pixel instead of 2601.
// 2.  **Border Policy**: Convolutions mirror the image at its edges without
//     repeating the edge pixel (reflect-101). Morphology simply ignores
//     neighbours that fall outside the grid, so borders neither grow nor erode
//     from phantom values.
// 3.  **Size-Derived Sigma**: A Gaussian given only a kernel size uses
//     `sigma = 0.3 * ((k - 1) * 0.5 - 1) + 0.8`, the common convention for
//     "blur with a k×k kernel".

use crate::core_modules::raster::{FloatMap, reflect_101};

/// Absolute value of the aperture-3 Laplacian (sum of the two second-order
/// Sobel derivatives), i.e. the kernel
/// ```text
///  2  0  2
///  0 -8  0
///  2  0  2
/// ```
pub fn laplacian_magnitude(gray: &FloatMap) -> FloatMap {
    let (rows, cols) = gray.dim();
    let mut out = FloatMap::zeros((rows, cols));
    if rows == 0 || cols == 0 {
        return out;
    }

    for row in 0..rows {
        let up = reflect_101(row as isize - 1, rows);
        let down = reflect_101(row as isize + 1, rows);
        for col in 0..cols {
            let left = reflect_101(col as isize - 1, cols);
            let right = reflect_101(col as isize + 1, cols);

            let corners = gray[[up, left]] + gray[[up, right]] + gray[[down, left]] + gray[[down, right]];
            let response = 2.0 * corners - 8.0 * gray[[row, col]];
            out[[row, col]] = response.abs();
        }
    }
    out
}

/// Sigma used for a Gaussian of odd size `ksize` when none is given.
pub fn sigma_for_kernel(ksize: usize) -> f64 {
    0.3 * ((ksize as f64 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Normalized 1D Gaussian taps of length `ksize`.
pub fn gaussian_kernel(ksize: usize) -> Vec<f32> {
    let sigma = sigma_for_kernel(ksize);
    let half = (ksize / 2) as f64;
    let denom = 2.0 * sigma * sigma;
    let taps: Vec<f64> = (0..ksize)
        .map(|i| {
            let x = i as f64 - half;
            (-x * x / denom).exp()
        })
        .collect();
    let sum: f64 = taps.iter().sum();
    taps.into_iter().map(|t| (t / sum) as f32).collect()
}

/// Separable Gaussian blur with a `ksize`×`ksize` kernel (ksize must be odd).
pub fn gaussian_blur(map: &FloatMap, ksize: usize) -> FloatMap {
    debug_assert!(ksize % 2 == 1, "gaussian kernel size must be odd");
    let (rows, cols) = map.dim();
    if rows == 0 || cols == 0 || ksize <= 1 {
        return map.clone();
    }

    let kernel = gaussian_kernel(ksize);
    let half = (ksize / 2) as isize;

    // --- Row pass ---
    let mut horizontal = FloatMap::zeros((rows, cols));
    for row in 0..rows {
        for col in 0..cols {
            let mut acc = 0.0f32;
            for (k, &weight) in kernel.iter().enumerate() {
                let c = reflect_101(col as isize + k as isize - half, cols);
                acc += weight * map[[row, c]];
            }
            horizontal[[row, col]] = acc;
        }
    }

    // --- Column pass ---
    let mut out = FloatMap::zeros((rows, cols));
    for row in 0..rows {
        for col in 0..cols {
            let mut acc = 0.0f32;
            for (k, &weight) in kernel.iter().enumerate() {
                let r = reflect_101(row as isize + k as isize - half, rows);
                acc += weight * horizontal[[r, col]];
            }
            out[[row, col]] = acc;
        }
    }
    out
}

#[derive(Clone, Copy)]
enum Extremum {
    Max,
    Min,
}

impl Extremum {
    fn pick(self, a: f32, b: f32) -> f32 {
        match self {
            Extremum::Max => a.max(b),
            Extremum::Min => a.min(b),
        }
    }
}

/// One separable pass of a square structuring element of side `size`.
fn rank_filter(map: &FloatMap, size: usize, extremum: Extremum) -> FloatMap {
    let (rows, cols) = map.dim();
    let radius = size / 2;

    let mut horizontal = FloatMap::zeros((rows, cols));
    for row in 0..rows {
        for col in 0..cols {
            let start = col.saturating_sub(radius);
            let end = (col + radius).min(cols - 1);
            let mut best = map[[row, start]];
            for c in start + 1..=end {
                best = extremum.pick(best, map[[row, c]]);
            }
            horizontal[[row, col]] = best;
        }
    }

    let mut out = FloatMap::zeros((rows, cols));
    for row in 0..rows {
        let start = row.saturating_sub(radius);
        let end = (row + radius).min(rows - 1);
        for col in 0..cols {
            let mut best = horizontal[[start, col]];
            for r in start + 1..=end {
                best = extremum.pick(best, horizontal[[r, col]]);
            }
            out[[row, col]] = best;
        }
    }
    out
}

/// Grey-level dilation (maximum filter) with a `size`×`size` square, applied `iterations` times.
pub fn dilate(map: &FloatMap, size: usize, iterations: usize) -> FloatMap {
    if map.is_empty() || size <= 1 {
        return map.clone();
    }
    let mut current = map.clone();
    for _ in 0..iterations {
        current = rank_filter(&current, size, Extremum::Max);
    }
    current
}

/// Grey-level erosion (minimum filter) with a `size`×`size` square.
pub fn erode(map: &FloatMap, size: usize) -> FloatMap {
    if map.is_empty() || size <= 1 {
        return map.clone();
    }
    rank_filter(map, size, Extremum::Min)
}

/// Morphological closing: dilation followed by erosion with the same square.
/// Fills dark gaps narrower than the element between bright regions.
pub fn close(map: &FloatMap, size: usize) -> FloatMap {
    erode(&dilate(map, size, 1), size)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn impulse(rows: usize, cols: usize, at: (usize, usize), value: f32) -> FloatMap {
        let mut map = FloatMap::zeros((rows, cols));
        map[[at.0, at.1]] = value;
        map
    }

    #[test]
    fn laplacian_of_flat_image_is_zero() {
        let flat = FloatMap::from_elem((6, 6), 128.0);
        assert!(laplacian_magnitude(&flat).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn laplacian_responds_to_isolated_point() {
        let map = impulse(5, 5, (2, 2), 10.0);
        let lap = laplacian_magnitude(&map);
        assert_eq!(lap[[2, 2]], 80.0);
        // Diagonal neighbours see the point through the corner weights.
        assert_eq!(lap[[1, 1]], 20.0);
        // Edge-adjacent neighbours have zero weight on it.
        assert_eq!(lap[[1, 2]], 0.0);
    }

    #[test]
    fn gaussian_kernel_is_normalized_and_symmetric() {
        for ksize in [3usize, 15, 31, 51] {
            let kernel = gaussian_kernel(ksize);
            assert_eq!(kernel.len(), ksize);
            let sum: f32 = kernel.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5, "kernel {ksize} sums to {sum}");
            for i in 0..ksize / 2 {
                assert!((kernel[i] - kernel[ksize - 1 - i]).abs() < 1e-7);
            }
        }
    }

    #[test]
    fn sigma_follows_kernel_size() {
        assert!((sigma_for_kernel(15) - 2.6).abs() < 1e-9);
        assert!((sigma_for_kernel(51) - 8.0).abs() < 1e-9);
    }

    #[test]
    fn blur_preserves_constant_maps() {
        let map = FloatMap::from_elem((9, 4), 3.5);
        let blurred = gaussian_blur(&map, 15);
        assert!(blurred.iter().all(|&v| (v - 3.5).abs() < 1e-4));
    }

    #[test]
    fn blur_spreads_an_impulse() {
        let map = impulse(21, 21, (10, 10), 1.0);
        let blurred = gaussian_blur(&map, 5);
        assert!(blurred[[10, 10]] < 1.0);
        assert!(blurred[[10, 11]] > 0.0);
        assert!(blurred[[10, 10]] > blurred[[10, 11]]);
    }

    #[test]
    fn dilate_grows_a_point_into_a_square() {
        let map = impulse(11, 11, (5, 5), 1.0);
        let grown = dilate(&map, 3, 1);
        let hot = grown.iter().filter(|&&v| v == 1.0).count();
        assert_eq!(hot, 9);

        let twice = dilate(&map, 3, 2);
        assert_eq!(twice.iter().filter(|&&v| v == 1.0).count(), 25);
    }

    #[test]
    fn dilate_clips_at_borders() {
        let map = impulse(5, 5, (0, 0), 1.0);
        let grown = dilate(&map, 3, 1);
        assert_eq!(grown.iter().filter(|&&v| v == 1.0).count(), 4);
    }

    #[test]
    fn close_fills_narrow_gaps() {
        let mut map = FloatMap::zeros((7, 9));
        for row in 0..7 {
            for col in 0..9 {
                if col != 4 {
                    map[[row, col]] = 1.0;
                }
            }
        }
        let closed = close(&map, 3);
        assert!(closed.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn close_keeps_isolated_dark_regions_wider_than_the_element() {
        let mut map = FloatMap::from_elem((9, 9), 1.0);
        for row in 2..7 {
            for col in 2..7 {
                map[[row, col]] = 0.0;
            }
        }
        let closed = close(&map, 3);
        assert_eq!(closed[[4, 4]], 0.0);
    }
}
