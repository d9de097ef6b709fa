//! ---
//! fl_section: "05-advisor"
//! fl_subsection: "module"
//! fl_type: "source"
//! fl_scope: "code"
//! fl_description: "Prediction advisor combining the external predictor and local rules."
//! fl_version: "v0.1.0"
//! fl_owner: "sre-platform"
//! ---
use std::sync::Arc;

use chrono::Local;
use faultline_common::config::SloConfig;
use faultline_metrics::SimulationMetrics;
use faultline_sim::ServiceRegistry;
use tracing::debug;

use crate::client::{IncidentPredictor, PredictorError};
use crate::fallback::{predict_service, predict_system};
use crate::prediction::{Prediction, RiskLevel};
use crate::signals::{feature_map, FeatureMap};

const SYSTEM_NAME: &str = "system";

/// Answers prediction requests against the live registry.
///
/// The registry is only read. When no predictor is configured, or the
/// predictor fails, the local rules answer instead.
pub struct PredictionAdvisor {
    registry: Arc<ServiceRegistry>,
    slo: SloConfig,
    predictor: Option<Arc<dyn IncidentPredictor>>,
    metrics: Option<SimulationMetrics>,
}

impl PredictionAdvisor {
    pub fn new(registry: Arc<ServiceRegistry>, slo: SloConfig) -> Self {
        Self {
            registry,
            slo,
            predictor: None,
            metrics: None,
        }
    }

    pub fn with_predictor(mut self, predictor: Arc<dyn IncidentPredictor>) -> Self {
        self.predictor = Some(predictor);
        self
    }

    pub fn with_metrics(mut self, metrics: SimulationMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Feature map for the current registry state.
    pub fn features(&self) -> FeatureMap {
        let root = self.registry.root_dependency();
        self.registry
            .read(|services| feature_map(services, root, &self.slo, &Local::now()))
    }

    /// Predict for `service`, or for the whole system when it is absent or
    /// unknown.
    pub async fn predict(&self, service: Option<&str>) -> Prediction {
        let Some(predictor) = &self.predictor else {
            self.record_fallback("disabled");
            return self.fallback(service);
        };

        let features = self.features();
        match predictor.predict(&features).await.and_then(checked) {
            Ok(mut prediction) => {
                if prediction.service_name.is_empty() {
                    prediction.service_name = service.unwrap_or(SYSTEM_NAME).to_owned();
                }
                prediction
            }
            Err(err) => {
                debug!(error = %err, reason = err.reason(), "external predictor unavailable; using fallback");
                self.record_fallback(err.reason());
                self.fallback(service)
            }
        }
    }

    /// Local rule-based answer.
    pub fn fallback(&self, service: Option<&str>) -> Prediction {
        self.registry.read(|services| {
            match service.and_then(|id| services.get_key_value(id)) {
                Some((id, svc)) => predict_service(id, svc),
                None => predict_system(services),
            }
        })
    }

    fn record_fallback(&self, reason: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_predictor_fallback(reason);
        }
    }
}

/// Reject probabilities outside [0, 1] and bucket the rest with the local
/// thresholds so `risk_level` always agrees with the probability.
fn checked(mut prediction: Prediction) -> Result<Prediction, PredictorError> {
    let probability = prediction.incident_probability;
    if !probability.is_finite() || !(0.0..=1.0).contains(&probability) {
        return Err(PredictorError::Probability(probability));
    }
    prediction.risk_level = RiskLevel::from_probability(probability);
    Ok(prediction)
}

impl std::fmt::Debug for PredictionAdvisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictionAdvisor")
            .field("slo", &self.slo)
            .field("predictor", &self.predictor.is_some())
            .finish_non_exhaustive()
    }
}
