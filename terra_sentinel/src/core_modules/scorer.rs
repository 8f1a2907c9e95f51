// THEORY:
// The `scorer` fuses texture chaos with the model's evidence into one calibrated
// number and hands it to the verdict layer.
//
// Key architectural principles:
// 1.  **Mode-Specific Raw Score**: Aerial tiles weight the classifier at 0.6 and
//     chaos at 0.4. Ground photos take the stronger of detector confidence and
//     scaled chaos, then add chaos again on top. That second term counts texture
//     twice; it is kept exactly as calibrated, and the raw sum may exceed 1.
// 2.  **Logistic Calibration**: The raw score is squashed by
//     `sigmoid(16 * (raw - x0))`, with `x0 = 0.60` for aerial tiles and
//     `x0 = 0.22` for ground photos, whose baseline texture runs much higher.
// 3.  **Hard Floor and Ceiling**: The calibrated score never leaves [0.01, 0.99],
//     so no single analysis claims certainty in either direction.

use crate::core_modules::activation::{ActivationSignal, AnalysisMode};
use crate::core_modules::verdict::{SiteStatus, classify_score};
use crate::error::{AnalysisError, Result};

const AERIAL_MODEL_WEIGHT: f64 = 0.6;
const AERIAL_CHAOS_WEIGHT: f64 = 0.4;
const AERIAL_MIDPOINT: f64 = 0.60;

const GROUND_CHAOS_PROXY_WEIGHT: f64 = 0.85;
const GROUND_SIGNAL_WEIGHT: f64 = 0.75;
const GROUND_CHAOS_WEIGHT: f64 = 0.45;
const GROUND_MIDPOINT: f64 = 0.22;

const SIGMOID_STEEPNESS: f64 = 16.0;
pub const SCORE_FLOOR: f64 = 0.01;
pub const SCORE_CEILING: f64 = 0.99;

/// The outcome of fusing one analysis' evidence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusedScore {
    pub raw_score: f64,
    pub final_score: f64,
    pub status: SiteStatus,
}

/// Sigmoid midpoint `x0` for a mode.
pub fn midpoint(mode: AnalysisMode) -> f64 {
    match mode {
        AnalysisMode::Satellite => AERIAL_MIDPOINT,
        AnalysisMode::Land => GROUND_MIDPOINT,
    }
}

pub fn aerial_raw_score(classification_score: f64, chaos_index: f64) -> f64 {
    classification_score * AERIAL_MODEL_WEIGHT + chaos_index * AERIAL_CHAOS_WEIGHT
}

pub fn ground_raw_score(detector_confidence: f64, chaos_index: f64) -> f64 {
    let signal = detector_confidence.max(chaos_index * GROUND_CHAOS_PROXY_WEIGHT);
    signal * GROUND_SIGNAL_WEIGHT + chaos_index * GROUND_CHAOS_WEIGHT
}

/// Raw (pre-calibration) score for a mode.
///
/// Without a signal, aerial mode falls back to the chaos index alone and ground
/// mode treats the detector as having found nothing. A signal from the other
/// model family is rejected.
pub fn raw_score(mode: AnalysisMode, chaos_index: f64, signal: Option<&ActivationSignal>) -> Result<f64> {
    let chaos_index = if chaos_index.is_finite() { chaos_index } else { 0.0 };
    match (mode, signal) {
        (AnalysisMode::Satellite, Some(ActivationSignal::Aerial { classification_score, .. })) => {
            Ok(aerial_raw_score(*classification_score, chaos_index))
        }
        (AnalysisMode::Satellite, None) => Ok(chaos_index),
        (AnalysisMode::Land, Some(ActivationSignal::Ground { max_confidence, .. })) => {
            Ok(ground_raw_score(*max_confidence, chaos_index))
        }
        (AnalysisMode::Land, None) => Ok(ground_raw_score(0.0, chaos_index)),
        (mode, Some(other)) => Err(AnalysisError::ModeMismatch {
            mode: mode.to_string(),
            signal: other.mode().to_string(),
        }),
    }
}

/// `clamp(sigmoid(16 * (raw - x0)), 0.01, 0.99)`.
pub fn calibrate(raw_score: f64, mode: AnalysisMode) -> f64 {
    let exponent = -SIGMOID_STEEPNESS * (raw_score - midpoint(mode));
    let squashed = 1.0 / (1.0 + exponent.exp());
    if squashed.is_nan() {
        return SCORE_FLOOR;
    }
    squashed.clamp(SCORE_FLOOR, SCORE_CEILING)
}

/// Fuses chaos and model evidence into a calibrated score and verdict.
pub fn fuse(mode: AnalysisMode, chaos_index: f64, signal: Option<&ActivationSignal>) -> Result<FusedScore> {
    let raw_score = raw_score(mode, chaos_index, signal)?;
    let final_score = calibrate(raw_score, mode);
    Ok(FusedScore {
        raw_score,
        final_score,
        status: classify_score(final_score),
    })
}
