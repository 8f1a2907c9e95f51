// THEORY:
// The `activation` module is the boundary between the engine and the models it
// does not own. An aerial classifier hands back a score and a coarse spatial
// activation grid; a ground detector hands back boxes with confidences. The
// engine never sees either model, only the data they produce.
//
// Key architectural principles:
// 1.  **Tagged Evidence**: `ActivationSignal` is a two-variant enum, one per
//     model family, so scoring can pattern-match on exactly the fields each
//     formula needs.
// 2.  **One Derived Form**: Whatever the variant, the compositor only ever asks
//     for a single 2-D intensity grid via `activation_map`. Box detections are
//     rasterized into a 0/1 mask at the working resolution; a classifier's
//     activation grid is passed through at its native resolution and resized
//     later by the compositor.
// 3.  **Sanitized at the Door**: Non-finite scores and confidences become 0.0 the
//     moment they enter, so nothing downstream has to re-check.

use crate::core_modules::raster::FloatMap;
use crate::error::{AnalysisError, Result};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which pathway a dumping-site analysis runs through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnalysisMode {
    /// Aerial or satellite tile, scored with a classifier's evidence.
    #[serde(rename = "sat")]
    Satellite,
    /// Ground-level photo, scored with a detector's evidence.
    #[serde(rename = "land")]
    Land,
}

impl AnalysisMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisMode::Satellite => "sat",
            AnalysisMode::Land => "land",
        }
    }
}

impl fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisMode {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sat" => Ok(AnalysisMode::Satellite),
            "land" => Ok(AnalysisMode::Land),
            other => Err(AnalysisError::InvalidMode(other.to_string())),
        }
    }
}

/// Axis-aligned box in normalized image coordinates (0..1).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Pixel span `[start, end)` of one axis, truncating like an integer cast
    /// and clamped to the axis.
    fn span(start: f32, end: f32, len: usize) -> (usize, usize) {
        let to_pixel = |v: f32| -> usize {
            if !v.is_finite() || v <= 0.0 {
                0
            } else {
                ((v * len as f32) as usize).min(len)
            }
        };
        (to_pixel(start), to_pixel(end))
    }
}

/// One ground-detector hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub confidence: f32,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
}

/// What an aerial classifier returns for one image.
#[derive(Debug, Clone)]
pub struct AerialPrediction {
    pub classification_score: f64,
    /// Spatial activation grid at whatever resolution the model produces.
    pub spatial_activation_map: FloatMap,
}

/// A pretrained aerial classifier, invoked as a black box.
pub trait AerialClassifier: Send + Sync {
    fn classify(&self, image: &RgbImage) -> Result<AerialPrediction>;
}

/// A pretrained ground-level object detector, invoked as a black box.
pub trait GroundDetector: Send + Sync {
    fn detect(&self, image: &RgbImage, confidence_floor: f32) -> Result<Vec<Detection>>;
}

/// Model evidence for one analysis, tagged by the model family that produced it.
#[derive(Debug, Clone)]
pub enum ActivationSignal {
    Aerial {
        classification_score: f64,
        spatial_map: FloatMap,
    },
    Ground {
        max_confidence: f64,
        boxes: Vec<BoundingBox>,
    },
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

impl ActivationSignal {
    pub fn aerial(classification_score: f64, spatial_map: FloatMap) -> Self {
        let spatial_map = spatial_map.mapv(|v| if v.is_finite() { v } else { 0.0 });
        ActivationSignal::Aerial {
            classification_score: sanitize(classification_score),
            spatial_map,
        }
    }

    pub fn from_prediction(prediction: AerialPrediction) -> Self {
        Self::aerial(prediction.classification_score, prediction.spatial_activation_map)
    }

    /// Collapses a detection list: the strongest confidence (0.0 when empty) plus every box.
    pub fn from_detections(detections: &[Detection]) -> Self {
        let max_confidence = detections
            .iter()
            .map(|d| sanitize(d.confidence as f64))
            .fold(0.0, f64::max);
        ActivationSignal::Ground {
            max_confidence,
            boxes: detections.iter().map(|d| d.bbox).collect(),
        }
    }

    /// The mode this evidence belongs to.
    pub fn mode(&self) -> AnalysisMode {
        match self {
            ActivationSignal::Aerial { .. } => AnalysisMode::Satellite,
            ActivationSignal::Ground { .. } => AnalysisMode::Land,
        }
    }

    /// The model's headline number: classification score or max detector confidence.
    pub fn model_score(&self) -> f64 {
        match self {
            ActivationSignal::Aerial { classification_score, .. } => *classification_score,
            ActivationSignal::Ground { max_confidence, .. } => *max_confidence,
        }
    }

    /// The single 2-D intensity grid the compositor consumes.
    ///
    /// Aerial maps are returned at their native resolution; box detections are
    /// rasterized at `rows`×`cols` with 1.0 inside any box and 0.0 elsewhere.
    pub fn activation_map(&self, rows: usize, cols: usize) -> FloatMap {
        match self {
            ActivationSignal::Aerial { spatial_map, .. } => spatial_map.clone(),
            ActivationSignal::Ground { boxes, .. } => {
                let mut map = FloatMap::zeros((rows, cols));
                for bbox in boxes {
                    let (c0, c1) = BoundingBox::span(bbox.x1, bbox.x2, cols);
                    let (r0, r1) = BoundingBox::span(bbox.y1, bbox.y2, rows);
                    for row in r0..r1 {
                        for col in c0..c1 {
                            map[[row, col]] = 1.0;
                        }
                    }
                }
                map
            }
        }
    }
}
