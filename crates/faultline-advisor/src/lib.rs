//! ---
//! fl_section: "05-advisor"
//! fl_subsection: "01-bootstrap"
//! fl_type: "source"
//! fl_scope: "code"
//! fl_description: "Prediction advisor module exports."
//! fl_version: "v0.1.0"
//! fl_owner: "sre-platform"
//! ---
//! Incident-risk estimation for the simulated topology.
//!
//! The [`PredictionAdvisor`] asks an external predictor first and falls back
//! to the local rules in [`fallback`] whenever the peer is disabled,
//! unreachable, or answers with something unusable.

pub mod advisor;
pub mod client;
pub mod fallback;
pub mod prediction;
pub mod signals;

pub use advisor::PredictionAdvisor;
pub use client::{HttpPredictor, IncidentPredictor, PredictorError};
pub use fallback::{predict_service, predict_system};
pub use prediction::{Prediction, RiskLevel, FALLBACK_MODEL_VERSION};
pub use signals::{feature_map, FeatureMap, TopologySignals};
