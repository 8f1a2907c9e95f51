use thiserror::Error;

/// Every failure the engine can surface to a caller.
///
/// Degenerate inputs (flat texture, no detections, no baseline vegetation)
/// are not errors; they have defined fallbacks inside the analyzers.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    #[error("failed to encode overlay: {0}")]
    ImageEncode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("input image is empty")]
    EmptyImage,

    #[error("shape mismatch: expected {expected:?} (rows, cols), got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("activation signal '{signal}' cannot be used in '{mode}' mode")]
    ModeMismatch { mode: String, signal: String },

    #[error("unknown analysis mode: {0} (expected 'sat' or 'land')")]
    InvalidMode(String),

    #[error("invalid geotag: {0}")]
    InvalidGeoTag(String),

    #[error("model collaborator failed: {0}")]
    Model(String),

    #[error("report sink failed: {0}")]
    Report(String),

    #[error("worker pool error: {0}")]
    Worker(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
