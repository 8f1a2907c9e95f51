// THEORY:
// The verdict layer turns a number into a word. Both pathways use the same
// banded classifier: an ordered list of exclusive lower bounds, highest first,
// with a fallback label for anything that clears none of them. Only the bands
// differ between the dumping-site score and the vegetation-loss percentage.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Dumping-site verdict for a calibrated score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SiteStatus {
    Safe,
    SuspiciousSite,
    IllegalDumping,
}

/// Vegetation-loss severity for a percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// UI hint paired with every label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusType {
    Success,
    Info,
    Warning,
    Danger,
}

/// `(exclusive lower bound, label)` pairs, checked in the order given.
pub type Bands<T> = [(f64, T)];

pub const SITE_BANDS: &Bands<SiteStatus> = &[
    (0.65, SiteStatus::IllegalDumping),
    (0.30, SiteStatus::SuspiciousSite),
];

pub const LOSS_BANDS: &Bands<Severity> = &[
    (30.0, Severity::Critical),
    (15.0, Severity::High),
    (5.0, Severity::Medium),
];

/// Returns the label of the first band whose bound `value` strictly exceeds.
pub fn classify<T: Copy>(value: f64, bands: &Bands<T>, fallback: T) -> T {
    bands
        .iter()
        .find(|(bound, _)| value > *bound)
        .map(|&(_, label)| label)
        .unwrap_or(fallback)
}

pub fn classify_score(final_score: f64) -> SiteStatus {
    classify(final_score, SITE_BANDS, SiteStatus::Safe)
}

pub fn classify_loss(percent_loss: f64) -> Severity {
    classify(percent_loss, LOSS_BANDS, Severity::Low)
}

impl SiteStatus {
    pub fn label(&self) -> &'static str {
        match self {
            SiteStatus::Safe => "Safe",
            SiteStatus::SuspiciousSite => "Suspicious Site",
            SiteStatus::IllegalDumping => "Illegal Dumping",
        }
    }

    pub fn status_type(&self) -> StatusType {
        match self {
            SiteStatus::Safe => StatusType::Success,
            SiteStatus::SuspiciousSite => StatusType::Warning,
            SiteStatus::IllegalDumping => StatusType::Danger,
        }
    }

    pub fn is_flagged(&self) -> bool {
        !matches!(self, SiteStatus::Safe)
    }
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
            Severity::Critical => "Critical",
        }
    }

    pub fn status_type(&self) -> StatusType {
        match self {
            Severity::Low => StatusType::Success,
            Severity::Medium => StatusType::Info,
            Severity::High => StatusType::Warning,
            Severity::Critical => StatusType::Danger,
        }
    }
}

impl fmt::Display for SiteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
