//! ---
//! fl_section: "05-advisor"
//! fl_subsection: "module"
//! fl_type: "source"
//! fl_scope: "code"
//! fl_description: "Client for the external incident predictor."
//! fl_version: "v0.1.0"
//! fl_owner: "sre-platform"
//! ---
use std::time::Duration;

use async_trait::async_trait;
use faultline_common::config::PredictorConfig;
use reqwest::{Client, StatusCode};

use crate::prediction::Prediction;
use crate::signals::FeatureMap;

/// Failures talking to the external predictor; every variant triggers the
/// local fallback.
#[derive(Debug, thiserror::Error)]
pub enum PredictorError {
    #[error("predictor unreachable: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("predictor answered with status {0}")]
    Status(StatusCode),
    #[error("predictor response could not be decoded: {0}")]
    Decode(#[source] reqwest::Error),
    #[error("predictor returned probability {0} outside [0, 1]")]
    Probability(f64),
}

impl PredictorError {
    /// Bounded label used for fallback metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            PredictorError::Transport(_) => "transport",
            PredictorError::Status(_) => "status",
            PredictorError::Decode(_) | PredictorError::Probability(_) => "decode",
        }
    }
}

/// Source of model-backed predictions.
#[async_trait]
pub trait IncidentPredictor: Send + Sync + 'static {
    /// Score the feature map; a single attempt, no retries.
    async fn predict(&self, features: &FeatureMap) -> Result<Prediction, PredictorError>;
}

/// Predictor reached over HTTP: `POST <endpoint>` with the feature map as JSON.
#[derive(Debug, Clone)]
pub struct HttpPredictor {
    client: Client,
    endpoint: String,
}

impl HttpPredictor {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn from_config(config: &PredictorConfig) -> anyhow::Result<Self> {
        Self::new(config.endpoint.clone(), config.timeout)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl IncidentPredictor for HttpPredictor {
    async fn predict(&self, features: &FeatureMap) -> Result<Prediction, PredictorError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(features)
            .send()
            .await
            .map_err(PredictorError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(PredictorError::Status(status));
        }
        response.json().await.map_err(PredictorError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::post;
    use axum::{Json, Router};
    use tokio::net::TcpListener;

    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        format!("http://{addr}/predict")
    }

    fn features() -> FeatureMap {
        let mut features = FeatureMap::new();
        features.insert("database_cpu".into(), 91.0);
        features
    }

    #[tokio::test]
    async fn posts_features_and_decodes_prediction() {
        let router = Router::new().route(
            "/predict",
            post(|Json(features): Json<FeatureMap>| async move {
                Json(serde_json::json!({
                    "service_name": "database",
                    "incident_probability": features["database_cpu"] / 100.0,
                    "risk_level": "critical",
                    "confidence": 0.93,
                    "predicted_incident_type": "cpu_overload",
                    "recommendation": "Scale the database tier.",
                    "model_version": "xgb_v3"
                }))
            }),
        );
        let predictor = HttpPredictor::new(serve(router).await, Duration::from_secs(2)).unwrap();

        let prediction = predictor.predict(&features()).await.unwrap();
        assert_eq!(prediction.incident_probability, 0.91);
        assert_eq!(prediction.model_version, "xgb_v3");
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let router = Router::new().route(
            "/predict",
            post(|| async { (AxumStatus::SERVICE_UNAVAILABLE, "model warming up") }),
        );
        let predictor = HttpPredictor::new(serve(router).await, Duration::from_secs(2)).unwrap();

        let err = predictor.predict(&features()).await.unwrap_err();
        assert!(matches!(err, PredictorError::Status(status) if status.as_u16() == 503));
        assert_eq!(err.reason(), "status");
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let router = Router::new().route("/predict", post(|| async { "not json" }));
        let predictor = HttpPredictor::new(serve(router).await, Duration::from_secs(2)).unwrap();

        let err = predictor.predict(&features()).await.unwrap_err();
        assert_eq!(err.reason(), "decode");
    }

    #[tokio::test]
    async fn unreachable_peer_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let predictor =
            HttpPredictor::new(format!("http://{addr}/predict"), Duration::from_secs(2)).unwrap();
        let err = predictor.predict(&features()).await.unwrap_err();
        assert_eq!(err.reason(), "transport");
    }
}
