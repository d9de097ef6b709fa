//! ---
//! fl_section: "03-observability"
//! fl_subsection: "module"
//! fl_type: "source"
//! fl_scope: "code"
//! fl_description: "Metrics collection and export utilities."
//! fl_version: "v0.1.0"
//! fl_owner: "sre-platform"
//! ---
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{
    GaugeVec, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder, TEXT_FORMAT,
};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Shared registry type used across services.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Router serving the registry at `/metrics`.
pub fn metrics_router(registry: SharedRegistry) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(registry)
}

/// Bind `addr` and serve [`metrics_router`] until [`MetricsServer::shutdown`].
///
/// Port 0 picks a free port; the bound one is reported by [`MetricsServer::addr`].
pub fn spawn_http_server(registry: SharedRegistry, addr: SocketAddr) -> Result<MetricsServer> {
    let std_listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind metrics listener {addr}"))?;
    std_listener
        .set_nonblocking(true)
        .context("failed to configure metrics listener as non-blocking")?;
    let local_addr = std_listener
        .local_addr()
        .context("failed to read metrics listener address")?;
    let listener =
        TcpListener::from_std(std_listener).context("failed to adopt metrics listener")?;

    info!(address = %local_addr, "metrics exporter listening");

    let app = metrics_router(registry);
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let task: JoinHandle<Result<()>> = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .context("metrics exporter failed")
    });

    Ok(MetricsServer {
        addr: local_addr,
        shutdown: Some(shutdown_tx),
        task,
    })
}

async fn metrics_handler(State(registry): State<SharedRegistry>) -> Response {
    match TextEncoder::new().encode_to_string(&registry.gather()) {
        Ok(body) => (
            [(header::CONTENT_TYPE, HeaderValue::from_static(TEXT_FORMAT))],
            body,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding error").into_response()
        }
    }
}

/// Handle to the running HTTP exporter.
#[derive(Debug)]
pub struct MetricsServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl MetricsServer {
    /// Return the bound address for convenience.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signal shutdown and await task completion.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(err),
            Err(join_err) => Err(anyhow::Error::new(join_err)),
        }
    }
}

/// Where the daemon's configuration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    File,
    Defaults,
}

impl ConfigSource {
    fn label(self) -> &'static str {
        match self {
            ConfigSource::File => "file",
            ConfigSource::Defaults => "defaults",
        }
    }
}

/// Process-level metrics recorded once per daemon start.
#[derive(Clone)]
pub struct DaemonMetrics {
    registry: SharedRegistry,
    starts_total: IntCounter,
    config_load_seconds: Histogram,
    config_source: IntGaugeVec,
    build_info: GaugeVec,
}

impl DaemonMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let starts_total = IntCounter::with_opts(Opts::new(
            "faultlined_starts_total",
            "Number of times the daemon has started",
        ))?;
        registry.register(Box::new(starts_total.clone()))?;

        // 1ms up to roughly 4s.
        let buckets = prometheus::exponential_buckets(0.001, 2.0, 13)
            .context("failed to construct config load buckets")?;
        let config_load_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "faultlined_config_load_seconds",
                "Time spent resolving and parsing the configuration",
            )
            .buckets(buckets),
        )?;
        registry.register(Box::new(config_load_seconds.clone()))?;

        let config_source = IntGaugeVec::new(
            Opts::new(
                "faultlined_config_source",
                "1 for the source the running configuration was loaded from",
            ),
            &["source"],
        )?;
        registry.register(Box::new(config_source.clone()))?;

        let build_info = GaugeVec::new(
            Opts::new("faultlined_build_info", "Version and profile of the daemon"),
            &["version", "profile"],
        )?;
        registry.register(Box::new(build_info.clone()))?;

        Ok(Self {
            registry,
            starts_total,
            config_load_seconds,
            config_source,
            build_info,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    /// Record one daemon start with its configuration load.
    pub fn record_start(&self, source: ConfigSource, load_seconds: f64) {
        self.starts_total.inc();
        self.config_load_seconds.observe(load_seconds);
        for candidate in [ConfigSource::File, ConfigSource::Defaults] {
            self.config_source
                .with_label_values(&[candidate.label()])
                .set(i64::from(candidate == source));
        }
    }

    pub fn set_build_info(&self, version: &str, profile: &str) {
        self.build_info
            .with_label_values(&[version, profile])
            .set(1.0);
    }
}

const STATUS_LABELS: [&str; 3] = ["healthy", "degraded", "down"];

/// Metrics published by the simulation engine: drift loop, fan-out and advisor.
#[derive(Clone, Debug)]
pub struct SimulationMetrics {
    registry: SharedRegistry,
    drift_ticks_total: IntCounter,
    broadcasts_total: IntCounter,
    subscribers_connected: IntGauge,
    subscriber_removals_total: IntCounterVec,
    service_status: IntGaugeVec,
    predictor_fallbacks_total: IntCounterVec,
}

impl SimulationMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let drift_ticks_total = IntCounter::with_opts(Opts::new(
            "faultline_drift_ticks_total",
            "Completed drift simulator ticks",
        ))?;
        registry.register(Box::new(drift_ticks_total.clone()))?;

        let broadcasts_total = IntCounter::with_opts(Opts::new(
            "faultline_broadcasts_total",
            "Snapshots fanned out to subscribers",
        ))?;
        registry.register(Box::new(broadcasts_total.clone()))?;

        let subscribers_connected = IntGauge::with_opts(Opts::new(
            "faultline_subscribers_connected",
            "Streaming subscribers currently registered",
        ))?;
        registry.register(Box::new(subscribers_connected.clone()))?;

        let subscriber_removals_total = IntCounterVec::new(
            Opts::new(
                "faultline_subscriber_removals_total",
                "Subscribers dropped after a failed push",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(subscriber_removals_total.clone()))?;

        let service_status = IntGaugeVec::new(
            Opts::new(
                "faultline_service_status",
                "Indicator (0/1) of the current status of each simulated service",
            ),
            &["service", "status"],
        )?;
        registry.register(Box::new(service_status.clone()))?;

        let predictor_fallbacks_total = IntCounterVec::new(
            Opts::new(
                "faultline_predictor_fallbacks_total",
                "Predictions served by the local rule engine instead of the external predictor",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(predictor_fallbacks_total.clone()))?;

        Ok(Self {
            registry,
            drift_ticks_total,
            broadcasts_total,
            subscribers_connected,
            subscriber_removals_total,
            service_status,
            predictor_fallbacks_total,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn inc_drift_tick(&self) {
        self.drift_ticks_total.inc();
    }

    pub fn inc_broadcast(&self) {
        self.broadcasts_total.inc();
    }

    pub fn set_subscribers(&self, count: usize) {
        self.subscribers_connected.set(count as i64);
    }

    pub fn record_subscriber_removal(&self, reason: &str) {
        self.subscriber_removals_total
            .with_label_values(&[reason])
            .inc();
    }

    /// Flag `status` as the current one for `service` and clear the others.
    pub fn set_service_status(&self, service: &str, status: &str) {
        for label in STATUS_LABELS {
            let value = if label == status { 1 } else { 0 };
            self.service_status
                .with_label_values(&[service, label])
                .set(value);
        }
    }

    pub fn record_predictor_fallback(&self, reason: &str) {
        self.predictor_fallbacks_total
            .with_label_values(&[reason])
            .inc();
    }
}

pub use prometheus;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_status_is_one_hot() {
        let registry = new_registry();
        let metrics = SimulationMetrics::new(registry.clone()).unwrap();
        metrics.set_service_status("database", "degraded");
        metrics.set_service_status("database", "down");

        let family = registry
            .gather()
            .into_iter()
            .find(|family| family.get_name() == "faultline_service_status")
            .unwrap();
        let active: Vec<_> = family
            .get_metric()
            .iter()
            .filter(|metric| metric.get_gauge().get_value() == 1.0)
            .map(|metric| {
                metric
                    .get_label()
                    .iter()
                    .find(|label| label.get_name() == "status")
                    .map(|label| label.get_value().to_owned())
                    .unwrap()
            })
            .collect();
        assert_eq!(active, vec!["down".to_owned()]);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = new_registry();
        SimulationMetrics::new(registry.clone()).unwrap();
        assert!(SimulationMetrics::new(registry).is_err());
    }

    #[test]
    fn config_source_marks_only_the_latest_source() {
        let registry = new_registry();
        let metrics = DaemonMetrics::new(registry).unwrap();
        metrics.record_start(ConfigSource::File, 0.01);
        metrics.record_start(ConfigSource::Defaults, 0.01);

        let source = |label| metrics.config_source.with_label_values(&[label]).get();
        assert_eq!(source("file"), 0);
        assert_eq!(source("defaults"), 1);
        assert_eq!(metrics.starts_total.get(), 2);
        assert_eq!(metrics.config_load_seconds.get_sample_count(), 2);
    }

    #[tokio::test]
    async fn exporter_serves_registered_metrics() {
        let registry = new_registry();
        let metrics = DaemonMetrics::new(registry.clone()).unwrap();
        metrics.record_start(ConfigSource::Defaults, 0.002);
        let server = spawn_http_server(registry, "127.0.0.1:0".parse().unwrap()).unwrap();

        let response = reqwest::get(format!("http://{}/metrics", server.addr()))
            .await
            .unwrap();
        assert!(response.status().is_success());
        assert_eq!(
            response.headers()["content-type"].to_str().unwrap(),
            prometheus::TEXT_FORMAT
        );
        let body = response.text().await.unwrap();
        assert!(body.contains("faultlined_starts_total 1"));
        assert!(body.contains("faultlined_config_source{source=\"defaults\"} 1"));
        assert!(body.contains("faultlined_config_source{source=\"file\"} 0"));

        server.shutdown().await.unwrap();
    }
}
