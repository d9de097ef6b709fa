//! ---
//! fl_section: "06-networking"
//! fl_subsection: "module"
//! fl_type: "source"
//! fl_scope: "code"
//! fl_description: "REST routes, static asset hosting, and server lifecycle."
//! fl_version: "v0.1.0"
//! fl_owner: "sre-platform"
//! ---
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use faultline_advisor::{Prediction, PredictionAdvisor};
use faultline_resilience::{ChaosEngine, ChaosError, ChaosRequest};
use faultline_sim::{ServiceRegistry, SnapshotBroadcaster};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::websocket::upgrade_handler;

/// Components shared with every handler.
pub struct ApiState {
    pub(crate) registry: Arc<ServiceRegistry>,
    pub(crate) broadcaster: Arc<SnapshotBroadcaster>,
    pub(crate) chaos: ChaosEngine,
    pub(crate) advisor: Arc<PredictionAdvisor>,
}

impl ApiState {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        broadcaster: Arc<SnapshotBroadcaster>,
        chaos: ChaosEngine,
        advisor: Arc<PredictionAdvisor>,
    ) -> Self {
        Self {
            registry,
            broadcaster,
            chaos,
            advisor,
        }
    }
}

/// Assemble the API routes, the `/ws` stream and, when `static_dir` is set,
/// a single-page-app fallback to its `index.html`.
pub fn build_router(state: Arc<ApiState>, static_dir: Option<PathBuf>) -> Router {
    let api_routes = Router::new()
        .route("/api/health", get(get_health))
        .route("/api/services", get(get_services))
        .route("/api/predict", get(get_system_prediction))
        .route("/api/predict/:service", get(get_service_prediction))
        .route("/api/chaos/inject", post(post_chaos))
        .route("/api/reset", post(post_reset))
        .route("/ws", get(upgrade_handler))
        .with_state(state);

    let router = match static_dir {
        Some(dir) => {
            let index = ServeFile::new(dir.join("index.html"));
            Router::new()
                .merge(api_routes)
                .fallback_service(ServeDir::new(dir).fallback(index))
        }
        None => api_routes,
    };

    router
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Handle to the running API server.
#[derive(Debug)]
pub struct ApiServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl ApiServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting connections and wait for in-flight requests.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(err.into()),
        }
    }
}

/// Bind `addr` and serve the router until [`ApiServer::shutdown`] is called.
pub fn spawn_api_server(
    state: Arc<ApiState>,
    addr: SocketAddr,
    static_dir: Option<PathBuf>,
) -> Result<ApiServer> {
    let router = build_router(state, static_dir);

    let listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind API listener {addr}"))?;
    listener
        .set_nonblocking(true)
        .context("failed to configure API listener as non-blocking")?;
    let local_addr = listener
        .local_addr()
        .context("failed to read API listener address")?;
    let tcp_listener =
        TcpListener::from_std(listener).context("failed to create tokio listener")?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let task: JoinHandle<Result<()>> = tokio::spawn(async move {
        info!(address = %local_addr, "api server listening");
        if let Err(err) = axum::serve(tcp_listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
        {
            error!(address = %local_addr, error = %err, "api server exited with error");
            return Err(err.into());
        }
        Ok(())
    });

    Ok(ApiServer {
        addr: local_addr,
        shutdown: Some(shutdown_tx),
        task,
    })
}

async fn get_health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

/// Same bytes the broadcaster pushes to stream subscribers.
async fn get_services(State(state): State<Arc<ApiState>>) -> Response {
    match state.registry.encode_snapshot() {
        Ok(body) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            )],
            body,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "failed to encode registry snapshot");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "snapshot unavailable" })),
            )
                .into_response()
        }
    }
}

async fn get_system_prediction(State(state): State<Arc<ApiState>>) -> Json<Prediction> {
    Json(state.advisor.predict(None).await)
}

async fn get_service_prediction(
    State(state): State<Arc<ApiState>>,
    Path(service): Path<String>,
) -> Json<Prediction> {
    Json(state.advisor.predict(Some(&service)).await)
}

async fn post_chaos(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<ChaosRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            warn!(error = %rejection, "rejected chaos request");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": rejection.body_text() })),
            )
                .into_response();
        }
    };

    match state.chaos.inject(request) {
        Ok(_) => Json(json!({ "status": "chaos injected" })).into_response(),
        Err(ChaosError::NotFound(_)) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Service not found" })),
        )
            .into_response(),
    }
}

async fn post_reset(State(state): State<Arc<ApiState>>) -> Json<serde_json::Value> {
    state.chaos.reset_all();
    Json(json!({ "status": "reset" }))
}
