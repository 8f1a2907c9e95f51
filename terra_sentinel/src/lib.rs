// THEORY:
// This file is the main entry point for the `terra_sentinel` library crate.
// It defines the public API exposed to callers such as the `sentinel_tester`
// binary or an HTTP front end.
//
// The primary goal is to export the `AnalysisEngine` (one synchronous call per
// image or image pair), the `ParallelPipeline` (the same work on a tokio worker
// pool), and the `service` layer that shapes results into serializable
// responses, persists geo-tagged reports and raises community alerts. The
// analyzers themselves live under `core_modules` and stay free of I/O.

pub mod core_modules;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod parallel_pipeline;
pub mod alert;
pub mod service;

pub use config::EngineConfig;
pub use core_modules::activation::{
    ActivationSignal, AerialClassifier, AerialPrediction, AnalysisMode, BoundingBox, Detection, GroundDetector,
};
pub use core_modules::vegetation::DeforestationResult;
pub use core_modules::verdict::{Severity, SiteStatus, StatusType};
pub use error::{AnalysisError, Result};
pub use pipeline::{AnalysisEngine, FusionResult};
pub use parallel_pipeline::ParallelPipeline;
