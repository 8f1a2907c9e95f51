// THEORY:
// The heatmap is painted with the classic "jet" ramp: dark blue for nothing,
// through cyan, yellow and red, to dark red for the strongest evidence. The
// ramp is defined once as a handful of color stops and baked into a 256-entry
// table on first use, so painting a pixel is a single lookup.

use std::sync::OnceLock;

/// A color stop: position in [0, 1] mapped to an RGB color.
#[derive(Debug, Clone, Copy)]
struct ColorStop {
    t: f64,
    color: [u8; 3],
}

impl ColorStop {
    const fn new(t: f64, r: u8, g: u8, b: u8) -> Self {
        Self { t, color: [r, g, b] }
    }
}

const JET_STOPS: &[ColorStop] = &[
    ColorStop::new(0.000, 0, 0, 128),
    ColorStop::new(0.125, 0, 0, 255),
    ColorStop::new(0.375, 0, 255, 255),
    ColorStop::new(0.625, 255, 255, 0),
    ColorStop::new(0.875, 255, 0, 0),
    ColorStop::new(1.000, 128, 0, 0),
];

static JET_LUT: OnceLock<[[u8; 3]; 256]> = OnceLock::new();

/// Linear interpolation between the two stops bracketing `t`.
fn interpolate(stops: &[ColorStop], t: f64) -> [u8; 3] {
    let t = t.clamp(0.0, 1.0);
    let upper = stops.iter().position(|s| s.t >= t).unwrap_or(stops.len() - 1);
    if upper == 0 {
        return stops[0].color;
    }
    let (lo, hi) = (stops[upper - 1], stops[upper]);
    let span = hi.t - lo.t;
    let frac = if span > 0.0 { (t - lo.t) / span } else { 0.0 };

    let mut out = [0u8; 3];
    for (channel, value) in out.iter_mut().enumerate() {
        let a = lo.color[channel] as f64;
        let b = hi.color[channel] as f64;
        *value = (a + (b - a) * frac).round() as u8;
    }
    out
}

fn jet_lut() -> &'static [[u8; 3]; 256] {
    JET_LUT.get_or_init(|| {
        let mut lut = [[0u8; 3]; 256];
        for (level, entry) in lut.iter_mut().enumerate() {
            *entry = interpolate(JET_STOPS, level as f64 / 255.0);
        }
        lut
    })
}

/// RGB color of an 8-bit intensity on the jet ramp.
#[inline]
pub fn jet(level: u8) -> [u8; 3] {
    jet_lut()[level as usize]
}
