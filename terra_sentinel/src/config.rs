// THEORY:
// `EngineConfig` carries the handful of knobs that belong to the deployment
// rather than to the calibration. The fusion weights, sigmoid midpoints and
// compositor kernel sizes are module constants next to the code that uses them;
// what lives here is the working resolution, the detector floor handed to the
// ground model, the community-alert policy, and the size of the worker pool.

use crate::error::{AnalysisError, Result};
use serde::{Deserialize, Serialize};
use std::env;

pub const DEFAULT_CANONICAL_SIZE: u32 = 800;
pub const DEFAULT_DETECTOR_CONFIDENCE_FLOOR: f32 = 0.05;
pub const DEFAULT_ALERT_SCORE_THRESHOLD: f64 = 0.80;
pub const DEFAULT_ALERT_CELL_DEGREES: f64 = 0.001;
pub const DEFAULT_ALERT_MIN_REPORTS: usize = 3;

/// Configuration for the analysis engine and its worker pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Side length of the square working resolution every site image is resized to.
    pub canonical_size: u32,
    /// Minimum confidence the ground detector is asked to report.
    pub detector_confidence_floor: f32,
    /// A single dumping verdict above this score raises a community alert on its own.
    pub alert_score_threshold: f64,
    /// Half-width, in degrees, of the lat/lng cell used to cluster nearby reports.
    pub alert_cell_degrees: f64,
    /// Number of flagged reports inside one cell that raises a community alert.
    pub alert_min_reports: usize,
    /// Number of workers in the parallel pipeline.
    pub worker_count: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            canonical_size: DEFAULT_CANONICAL_SIZE,
            detector_confidence_floor: DEFAULT_DETECTOR_CONFIDENCE_FLOOR,
            alert_score_threshold: DEFAULT_ALERT_SCORE_THRESHOLD,
            alert_cell_degrees: DEFAULT_ALERT_CELL_DEGREES,
            alert_min_reports: DEFAULT_ALERT_MIN_REPORTS,
            worker_count: num_cpus::get().max(1),
        }
    }
}

impl EngineConfig {
    /// Builds a config from `SENTINEL_*` environment variables, falling back to
    /// the defaults for anything unset. Values that are set but unparsable are errors.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            canonical_size: env_or("SENTINEL_CANONICAL_SIZE", defaults.canonical_size)?,
            detector_confidence_floor: env_or(
                "SENTINEL_DETECTOR_FLOOR",
                defaults.detector_confidence_floor,
            )?,
            alert_score_threshold: env_or("SENTINEL_ALERT_SCORE", defaults.alert_score_threshold)?,
            alert_cell_degrees: env_or("SENTINEL_ALERT_CELL", defaults.alert_cell_degrees)?,
            alert_min_reports: env_or("SENTINEL_ALERT_MIN_REPORTS", defaults.alert_min_reports)?,
            worker_count: env_or("SENTINEL_WORKERS", defaults.worker_count)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.canonical_size == 0 {
            return Err(AnalysisError::Config("canonical_size must be positive".into()));
        }
        if self.worker_count == 0 {
            return Err(AnalysisError::Config("worker_count must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.detector_confidence_floor) {
            return Err(AnalysisError::Config(format!(
                "detector_confidence_floor must be in [0, 1], got {}",
                self.detector_confidence_floor
            )));
        }
        if !(0.0..=1.0).contains(&self.alert_score_threshold) {
            return Err(AnalysisError::Config(format!(
                "alert_score_threshold must be in [0, 1], got {}",
                self.alert_score_threshold
            )));
        }
        if !(self.alert_cell_degrees > 0.0) {
            return Err(AnalysisError::Config(format!(
                "alert_cell_degrees must be positive, got {}",
                self.alert_cell_degrees
            )));
        }
        if self.alert_min_reports == 0 {
            return Err(AnalysisError::Config("alert_min_reports must be positive".into()));
        }
        Ok(())
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| AnalysisError::Config(format!("{key} has unparsable value '{raw}'"))),
        _ => Ok(default),
    }
}
