// THEORY:
// The `pipeline` module is the top-level synchronous API of the engine. One call
// takes one upload (or a before/after pair) from raw bytes to a finished result.
//
// Stages of a site analysis:
//   1. Decode and resize to the canonical working resolution.
//   2. Texture analysis (always runs, needs no model).
//   3. Model evidence: the aerial classifier in `sat` mode, the ground detector
//      in `land` mode. Either may be absent; the scorer has a fallback for both.
//   4. Fusion and calibration into a final score and verdict.
//   5. Heatmap composition from the same intermediate maps.
//
// The deforestation path is independent: decode both images and hand them to
// the vegetation-change detector. It never touches the scorer.

use crate::config::EngineConfig;
use crate::core_modules::activation::{ActivationSignal, AerialClassifier, AnalysisMode, GroundDetector};
use crate::core_modules::heatmap::composite_heatmap;
use crate::core_modules::image_helper::{canonicalize, decode_rgb, encode_png, png_data_uri};
use crate::core_modules::raster::FloatMap;
use crate::core_modules::scorer::fuse;
use crate::core_modules::texture_analyzer::analyze_texture;
use crate::core_modules::vegetation::{self, DeforestationResult};
use crate::core_modules::verdict::SiteStatus;
use crate::error::Result;
use image::RgbImage;
use std::sync::Arc;
use tracing::{debug, info};

/// The result of one dumping-site analysis.
#[derive(Debug, Clone)]
pub struct FusionResult {
    /// Calibrated score in [0.01, 0.99].
    pub final_score: f64,
    pub status: SiteStatus,
    /// The working-resolution image with the anomaly heatmap blended in.
    pub heatmap_overlay: RgbImage,
    pub raw_score: f64,
    pub chaos_index: f64,
    pub mode: AnalysisMode,
}

impl FusionResult {
    pub fn heatmap_png(&self) -> Result<Vec<u8>> {
        encode_png(&self.heatmap_overlay)
    }

    pub fn heatmap_data_uri(&self) -> Result<String> {
        Ok(png_data_uri(&self.heatmap_png()?))
    }
}

/// Scores an image that is already at its working resolution against the given
/// model evidence. With no evidence the activation map is blank.
pub fn analyze_with_signal(
    image: &RgbImage,
    mode: AnalysisMode,
    signal: Option<&ActivationSignal>,
) -> Result<FusionResult> {
    let texture = analyze_texture(image)?;
    let fused = fuse(mode, texture.chaos_index, signal)?;

    let (rows, cols) = (image.height() as usize, image.width() as usize);
    let activation_map = match signal {
        Some(signal) => signal.activation_map(rows, cols),
        None => FloatMap::zeros((rows, cols)),
    };
    let heatmap_overlay = composite_heatmap(image, &activation_map, &texture.magnitude, mode)?;

    debug!(
        mode = %mode,
        model_score = signal.map_or(0.0, |s| s.model_score()),
        chaos = texture.chaos_index,
        raw = fused.raw_score,
        final_score = fused.final_score,
        "site trace"
    );

    Ok(FusionResult {
        final_score: fused.final_score,
        status: fused.status,
        heatmap_overlay,
        raw_score: fused.raw_score,
        chaos_index: texture.chaos_index,
        mode,
    })
}

/// The analysis engine: configuration plus whichever models are available.
#[derive(Clone)]
pub struct AnalysisEngine {
    config: EngineConfig,
    classifier: Option<Arc<dyn AerialClassifier>>,
    detector: Option<Arc<dyn GroundDetector>>,
}

impl AnalysisEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            classifier: None,
            detector: None,
        })
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn AerialClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_detector(mut self, detector: Arc<dyn GroundDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs the model for `mode`, if one is attached.
    pub fn gather_signal(&self, image: &RgbImage, mode: AnalysisMode) -> Result<Option<ActivationSignal>> {
        match mode {
            AnalysisMode::Satellite => match &self.classifier {
                Some(classifier) => Ok(Some(ActivationSignal::from_prediction(classifier.classify(image)?))),
                None => {
                    debug!("no aerial classifier attached, scoring on texture alone");
                    Ok(None)
                }
            },
            AnalysisMode::Land => match &self.detector {
                Some(detector) => {
                    let detections = detector.detect(image, self.config.detector_confidence_floor)?;
                    debug!(detections = detections.len(), "ground detector finished");
                    Ok(Some(ActivationSignal::from_detections(&detections)))
                }
                None => {
                    debug!("no ground detector attached, assuming no detections");
                    Ok(None)
                }
            },
        }
    }

    /// Full site analysis on a decoded image of any size.
    pub fn analyze_site(&self, image: &RgbImage, mode: AnalysisMode) -> Result<FusionResult> {
        let working = canonicalize(image, self.config.canonical_size);
        let signal = self.gather_signal(&working, mode)?;
        let result = analyze_with_signal(&working, mode, signal.as_ref())?;
        info!(
            mode = %mode,
            status = %result.status,
            score = result.final_score,
            "site analysis complete"
        );
        Ok(result)
    }

    pub fn analyze_site_bytes(&self, bytes: &[u8], mode: AnalysisMode) -> Result<FusionResult> {
        let image = decode_rgb(bytes)?;
        self.analyze_site(&image, mode)
    }

    pub fn analyze_deforestation(&self, before: &RgbImage, after: &RgbImage) -> Result<DeforestationResult> {
        let result = vegetation::analyze_deforestation(before, after)?;
        info!(
            percent_loss = result.percent_loss,
            severity = %result.severity,
            "deforestation analysis complete"
        );
        Ok(result)
    }

    pub fn analyze_deforestation_bytes(&self, before: &[u8], after: &[u8]) -> Result<DeforestationResult> {
        let before = decode_rgb(before)?;
        let after = decode_rgb(after)?;
        self.analyze_deforestation(&before, &after)
    }
}
