// THEORY:
// The `service` layer is what an HTTP handler (or the CLI) talks to. It accepts
// upload-shaped requests, runs the engine, and shapes the result into the
// response bodies a front end expects. It also owns the two side effects an
// analysis can have: recording a geo-tagged report, and deciding whether that
// report raises a community alert.
//
// Key architectural principles:
// 1.  **Serializable Edges**: Every request and response derives serde, so the
//     transport is someone else's concern.
// 2.  **Storage Behind a Trait**: Reports go to a `ReportSink`. The engine ships
//     an in-memory sink; a database-backed one plugs in the same way.
// 3.  **Only Geo-Tagged Results Persist**: A request without coordinates is
//     analyzed and answered, and leaves no trace.

use crate::alert::{AlertReason, evaluate_community_alert};
use crate::core_modules::activation::AnalysisMode;
use crate::core_modules::image_helper::{encode_png, png_data_uri};
use crate::core_modules::vegetation::DeforestationResult;
use crate::core_modules::verdict::{Severity, StatusType};
use crate::error::{AnalysisError, Result};
use crate::pipeline::{AnalysisEngine, FusionResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// A validated WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Result<Self> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(AnalysisError::InvalidGeoTag(format!("latitude {lat} out of range")));
        }
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(AnalysisError::InvalidGeoTag(format!("longitude {lng} out of range")));
        }
        Ok(Self { lat, lng })
    }

    /// Parses form-style coordinates. Either field empty or `"null"` means the
    /// upload is not geo-tagged.
    pub fn parse(lat: &str, lng: &str) -> Result<Option<Self>> {
        let is_absent = |s: &str| {
            let s = s.trim();
            s.is_empty() || s.eq_ignore_ascii_case("null")
        };
        if is_absent(lat) || is_absent(lng) {
            return Ok(None);
        }
        let parse = |s: &str| {
            s.trim()
                .parse::<f64>()
                .map_err(|_| AnalysisError::InvalidGeoTag(format!("'{s}' is not a coordinate")))
        };
        Self::new(parse(lat)?, parse(lng)?).map(Some)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportCategory {
    Landfill,
    Deforestation,
}

/// One persisted, geo-tagged analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub lat: f64,
    pub lng: f64,
    /// Final score for dumping reports, `percent_loss / 100` for deforestation.
    pub score: f64,
    pub category: ReportCategory,
    /// Verdict or severity label, e.g. "Illegal Dumping" or "Critical".
    pub status: String,
    pub image_path: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Where geo-tagged reports are stored.
pub trait ReportSink: Send + Sync {
    fn record(&self, report: ReportRecord) -> Result<()>;
    fn reports(&self) -> Result<Vec<ReportRecord>>;
}

#[derive(Debug, Default)]
pub struct InMemoryReportSink {
    reports: Mutex<Vec<ReportRecord>>,
}

impl InMemoryReportSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.reports.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ReportSink for InMemoryReportSink {
    fn record(&self, report: ReportRecord) -> Result<()> {
        self.reports
            .lock()
            .map_err(|e| AnalysisError::Report(e.to_string()))?
            .push(report);
        Ok(())
    }

    fn reports(&self) -> Result<Vec<ReportRecord>> {
        Ok(self
            .reports
            .lock()
            .map_err(|e| AnalysisError::Report(e.to_string()))?
            .clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteRequest {
    pub image: Vec<u8>,
    pub mode: AnalysisMode,
    pub location: Option<GeoPoint>,
    /// Where the caller stored the upload, recorded alongside the report.
    pub image_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteResponse {
    pub success: bool,
    /// Upper-case verdict, e.g. "ILLEGAL DUMPING".
    pub prediction: String,
    pub status_type: StatusType,
    /// Final score as a percentage, two decimals.
    pub confidence: f64,
    /// `data:image/png;base64,...`
    pub heatmap: String,
    pub geo_tagged: bool,
    pub community_alert: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeforestationRequest {
    pub before: Vec<u8>,
    pub after: Vec<u8>,
    pub location: Option<GeoPoint>,
    pub image_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeforestationResponse {
    pub success: bool,
    pub vegetation_loss: f64,
    pub severity: Severity,
    pub status_type: StatusType,
    pub heatmap: String,
    pub geo_tagged: bool,
    pub vegetation_before: f64,
    pub vegetation_after: f64,
    pub changes: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl From<AnalysisError> for ErrorResponse {
    fn from(error: AnalysisError) -> Self {
        Self {
            success: false,
            error: error.to_string(),
        }
    }
}

fn percent_2dp(score: f64) -> f64 {
    (score * 10_000.0).round() / 100.0
}

/// Loss is always printed with a decimal point, e.g. "75.0%".
fn change_summary(percent_loss: f64) -> String {
    format!("Detecting {percent_loss:?}% vegetation loss in the specified temporal window.")
}

/// Follow-up actions suggested for a loss severity.
pub fn recommendations(severity: Severity) -> Vec<String> {
    let field = match severity {
        Severity::Critical | Severity::High => "Deploy ground task force for verification",
        Severity::Medium | Severity::Low => "Continue remote monitoring",
    };
    let permits = match severity {
        Severity::Low => "Area appears stable",
        _ => "Check for illegal logging permits",
    };
    vec![field.to_string(), permits.to_string()]
}

/// The request-facing front of the engine.
pub struct SentinelService {
    engine: AnalysisEngine,
    sink: Arc<dyn ReportSink>,
}

impl SentinelService {
    pub fn new(engine: AnalysisEngine, sink: Arc<dyn ReportSink>) -> Self {
        Self { engine, sink }
    }

    pub fn engine(&self) -> &AnalysisEngine {
        &self.engine
    }

    /// Records a geo-tagged dumping result and decides whether it raises a
    /// community alert.
    fn record_site(&self, location: GeoPoint, request: &SiteRequest, result: &FusionResult) -> Result<bool> {
        let record = ReportRecord {
            lat: location.lat,
            lng: location.lng,
            score: result.final_score,
            category: ReportCategory::Landfill,
            status: result.status.label().to_string(),
            image_path: request.image_path.clone(),
            timestamp: Utc::now(),
        };
        self.sink.record(record.clone())?;
        let history = self.sink.reports()?;

        let reason = evaluate_community_alert(self.engine.config(), &history, &record);
        match reason {
            Some(AlertReason::HighConfidence { score }) => {
                warn!(lat = location.lat, lng = location.lng, score, "community alert: high-risk site")
            }
            Some(AlertReason::Cluster { reports }) => {
                warn!(lat = location.lat, lng = location.lng, reports, "community alert: report cluster")
            }
            None => {}
        }
        Ok(reason.is_some())
    }

    /// Site analysis returning both the response body and the full result.
    pub fn analyze_site_detailed(&self, request: &SiteRequest) -> Result<(SiteResponse, FusionResult)> {
        let result = self.engine.analyze_site_bytes(&request.image, request.mode)?;

        let community_alert = match request.location {
            Some(location) => self.record_site(location, request, &result)?,
            None => false,
        };

        let response = SiteResponse {
            success: true,
            prediction: result.status.label().to_uppercase(),
            status_type: result.status.status_type(),
            confidence: percent_2dp(result.final_score),
            heatmap: result.heatmap_data_uri()?,
            geo_tagged: request.location.is_some(),
            community_alert,
        };
        Ok((response, result))
    }

    pub fn analyze_site(&self, request: &SiteRequest) -> Result<SiteResponse> {
        self.analyze_site_detailed(request).map(|(response, _)| response)
    }

    pub fn analyze_deforestation_detailed(
        &self,
        request: &DeforestationRequest,
    ) -> Result<(DeforestationResponse, DeforestationResult)> {
        let result = self.engine.analyze_deforestation_bytes(&request.before, &request.after)?;

        if let Some(location) = request.location {
            self.sink.record(ReportRecord {
                lat: location.lat,
                lng: location.lng,
                score: result.percent_loss / 100.0,
                category: ReportCategory::Deforestation,
                status: result.severity.label().to_string(),
                image_path: request.image_path.clone(),
                timestamp: Utc::now(),
            })?;
            info!(lat = location.lat, lng = location.lng, "deforestation report recorded");
        }

        let png = encode_png(&result.loss_overlay)?;
        let response = DeforestationResponse {
            success: true,
            vegetation_loss: result.percent_loss,
            severity: result.severity,
            status_type: result.severity.status_type(),
            heatmap: png_data_uri(&png),
            geo_tagged: request.location.is_some(),
            vegetation_before: result.vegetation_before_pct,
            vegetation_after: result.vegetation_after_pct,
            changes: vec![change_summary(result.percent_loss)],
            recommendations: recommendations(result.severity),
        };
        Ok((response, result))
    }

    pub fn analyze_deforestation(&self, request: &DeforestationRequest) -> Result<DeforestationResponse> {
        self.analyze_deforestation_detailed(request).map(|(response, _)| response)
    }

    /// `analyze_site` with failures folded into an `ErrorResponse`.
    pub fn handle_site(&self, request: &SiteRequest) -> std::result::Result<SiteResponse, ErrorResponse> {
        self.analyze_site(request).map_err(|e| {
            warn!(error = %e, "site analysis failed");
            ErrorResponse::from(e)
        })
    }

    pub fn handle_deforestation(
        &self,
        request: &DeforestationRequest,
    ) -> std::result::Result<DeforestationResponse, ErrorResponse> {
        self.analyze_deforestation(request).map_err(|e| {
            warn!(error = %e, "deforestation analysis failed");
            ErrorResponse::from(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geo_tags_parse_form_values() {
        assert_eq!(GeoPoint::parse("null", "null").unwrap(), None);
        assert_eq!(GeoPoint::parse("12.5", "").unwrap(), None);
        assert_eq!(
            GeoPoint::parse(" 12.5 ", "-70.25").unwrap(),
            Some(GeoPoint { lat: 12.5, lng: -70.25 })
        );
        assert!(matches!(GeoPoint::parse("north", "10"), Err(AnalysisError::InvalidGeoTag(_))));
        assert!(GeoPoint::parse("91", "0").is_err());
        assert!(GeoPoint::new(0.0, f64::NAN).is_err());
    }

    #[test]
    fn confidence_is_a_two_decimal_percentage() {
        assert_eq!(percent_2dp(0.27714), 27.71);
        assert_eq!(percent_2dp(0.99), 99.0);
        assert_eq!(percent_2dp(0.01), 1.0);
    }

    #[test]
    fn change_summary_keeps_the_decimal_point() {
        assert_eq!(
            change_summary(75.0),
            "Detecting 75.0% vegetation loss in the specified temporal window."
        );
        assert!(change_summary(12.34).contains("12.34%"));
    }

    #[test]
    fn recommendations_follow_severity() {
        assert_eq!(
            recommendations(Severity::Critical),
            vec!["Deploy ground task force for verification", "Check for illegal logging permits"]
        );
        assert_eq!(
            recommendations(Severity::Low),
            vec!["Continue remote monitoring", "Area appears stable"]
        );
        assert_eq!(recommendations(Severity::Medium)[1], "Check for illegal logging permits");
    }

    #[test]
    fn in_memory_sink_keeps_reports() {
        let sink = InMemoryReportSink::new();
        assert!(sink.is_empty());
        sink.record(ReportRecord {
            lat: 1.0,
            lng: 2.0,
            score: 0.5,
            category: ReportCategory::Deforestation,
            status: "Medium".into(),
            image_path: Some("/uploads/reports/a.png".into()),
            timestamp: Utc::now(),
        })
        .unwrap();
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.reports().unwrap()[0].category, ReportCategory::Deforestation);
    }

    #[test]
    fn error_response_carries_message() {
        let response = ErrorResponse::from(AnalysisError::EmptyImage);
        assert!(!response.success);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["success"], false);
        assert!(json["error"].as_str().unwrap().len() > 0);
    }
}
