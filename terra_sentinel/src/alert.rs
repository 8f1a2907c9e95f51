// THEORY:
// A community alert means "somebody should go and look". It is raised for a new
// geo-tagged dumping report in one of two ways: the report alone is a
// high-confidence `Illegal Dumping` verdict, or it lands in a small lat/lng
// cell that already holds enough other flagged reports. Any report whose status
// is not `Safe` counts towards a cell, deforestation included, so a string of
// individually uncertain sightings adds up to an alert.

use crate::config::EngineConfig;
use crate::core_modules::verdict::SiteStatus;
use crate::service::{ReportCategory, ReportRecord};

/// Why a community alert was raised.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AlertReason {
    /// The new report alone is an `Illegal Dumping` verdict above the score threshold.
    HighConfidence { score: f64 },
    /// Enough flagged reports share the new report's cell.
    Cluster { reports: usize },
}

fn is_flagged(record: &ReportRecord) -> bool {
    record.status != SiteStatus::Safe.label()
}

fn same_cell(a: &ReportRecord, b: &ReportRecord, cell_degrees: f64) -> bool {
    (a.lat - b.lat).abs() < cell_degrees && (a.lng - b.lng).abs() < cell_degrees
}

/// Decides whether a new dumping report raises a community alert. `history`
/// must already contain `new`, so it counts towards its own cluster.
/// Deforestation reports never raise one themselves.
pub fn evaluate_community_alert(
    config: &EngineConfig,
    history: &[ReportRecord],
    new: &ReportRecord,
) -> Option<AlertReason> {
    if new.category != ReportCategory::Landfill {
        return None;
    }

    if new.status == SiteStatus::IllegalDumping.label() && new.score > config.alert_score_threshold {
        return Some(AlertReason::HighConfidence { score: new.score });
    }

    let reports = history
        .iter()
        .filter(|r| is_flagged(r) && same_cell(r, new, config.alert_cell_degrees))
        .count();
    (reports >= config.alert_min_reports).then_some(AlertReason::Cluster { reports })
}
