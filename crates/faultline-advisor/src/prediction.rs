//! ---
//! fl_section: "05-advisor"
//! fl_subsection: "module"
//! fl_type: "source"
//! fl_scope: "code"
//! fl_description: "Prediction payload and risk levels."
//! fl_version: "v0.1.0"
//! fl_owner: "sre-platform"
//! ---
use std::fmt;

use serde::{Deserialize, Serialize};

pub const FALLBACK_MODEL_VERSION: &str = "fallback_v1";

/// Coarse risk bucket derived from an incident probability.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Bucket a probability; every threshold is exclusive.
    pub fn from_probability(probability: f64) -> Self {
        if probability > 0.7 {
            RiskLevel::Critical
        } else if probability > 0.5 {
            RiskLevel::High
        } else if probability > 0.3 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Incident-risk estimate returned by the prediction endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prediction {
    #[serde(default)]
    pub service_name: String,
    pub incident_probability: f64,
    pub risk_level: RiskLevel,
    pub confidence: f64,
    pub predicted_incident_type: String,
    pub recommendation: String,
    pub model_version: String,
}
