//! ---
//! fl_section: "01-core-functionality"
//! fl_subsection: "module"
//! fl_type: "source"
//! fl_scope: "code"
//! fl_description: "Simulation runtime construction and lifecycle management."
//! fl_version: "v0.1.0"
//! fl_owner: "sre-platform"
//! ---
use std::sync::Arc;

use anyhow::{Context, Result};
use faultline_advisor::{HttpPredictor, PredictionAdvisor};
use faultline_common::config::AppConfig;
use faultline_metrics::{SharedRegistry, SimulationMetrics};
use faultline_resilience::{ChaosEngine, ChaosMetrics};
use faultline_sim::{DriftSimulator, ServiceRegistry, SnapshotBroadcaster};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Builds every simulation component from configuration.
#[derive(Debug)]
pub struct SimulationRuntime {
    config: Arc<AppConfig>,
    metrics_registry: Option<SharedRegistry>,
}

impl SimulationRuntime {
    pub fn new(config: AppConfig, metrics: Option<SharedRegistry>) -> Self {
        Self {
            config: Arc::new(config),
            metrics_registry: metrics,
        }
    }

    /// Validate the configuration, wire the components and start the drift loop.
    pub async fn start(self) -> Result<RuntimeHandle> {
        self.config
            .validate()
            .context("refusing to start with an invalid configuration")?;

        let simulation_metrics = match &self.metrics_registry {
            Some(registry) => Some(SimulationMetrics::new(registry.clone())?),
            None => None,
        };
        let chaos_metrics = match &self.metrics_registry {
            Some(registry) => Some(ChaosMetrics::new(registry.clone())?),
            None => None,
        };

        let simulation = &self.config.simulation;
        let mut registry =
            ServiceRegistry::from_topology(&self.config.topology, simulation.random_seed);
        let mut broadcaster = SnapshotBroadcaster::new(simulation.subscriber_buffer);
        if let Some(metrics) = &simulation_metrics {
            registry = registry.with_metrics(metrics.clone());
            broadcaster = broadcaster.with_metrics(metrics.clone());
        }
        let registry = Arc::new(registry);
        let broadcaster = Arc::new(broadcaster);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let chaos = match chaos_metrics {
            Some(metrics) => ChaosEngine::with_metrics(
                registry.clone(),
                broadcaster.clone(),
                shutdown_rx.clone(),
                metrics,
            ),
            None => ChaosEngine::new(registry.clone(), broadcaster.clone(), shutdown_rx.clone()),
        };

        let mut advisor = PredictionAdvisor::new(registry.clone(), self.config.slo);
        if self.config.predictor.enabled {
            let predictor = HttpPredictor::from_config(&self.config.predictor)
                .context("failed to build external predictor client")?;
            info!(endpoint = %predictor.endpoint(), "external predictor configured");
            advisor = advisor.with_predictor(Arc::new(predictor));
        } else {
            warn!("external predictor disabled; local rules answer every prediction");
        }
        if let Some(metrics) = &simulation_metrics {
            advisor = advisor.with_metrics(metrics.clone());
        }

        let mut drift = DriftSimulator::new(
            registry.clone(),
            broadcaster.clone(),
            simulation.tick_interval,
        );
        if let Some(metrics) = simulation_metrics {
            drift = drift.with_metrics(metrics);
        }
        let drift_task = drift.spawn(shutdown_rx);

        info!(
            services = registry.len(),
            root = registry.root_dependency().unwrap_or("-"),
            tick_ms = simulation.tick_interval.as_millis() as u64,
            "simulation runtime started"
        );

        Ok(RuntimeHandle {
            config: self.config.clone(),
            registry,
            broadcaster,
            chaos,
            advisor: Arc::new(advisor),
            metrics_registry: self.metrics_registry.clone(),
            shutdown: shutdown_tx,
            drift_task,
        })
    }
}

/// Live components plus the controls needed to stop them.
#[derive(Debug)]
pub struct RuntimeHandle {
    config: Arc<AppConfig>,
    registry: Arc<ServiceRegistry>,
    broadcaster: Arc<SnapshotBroadcaster>,
    chaos: ChaosEngine,
    advisor: Arc<PredictionAdvisor>,
    metrics_registry: Option<SharedRegistry>,
    shutdown: watch::Sender<bool>,
    drift_task: JoinHandle<()>,
}

impl RuntimeHandle {
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> Arc<ServiceRegistry> {
        self.registry.clone()
    }

    pub fn broadcaster(&self) -> Arc<SnapshotBroadcaster> {
        self.broadcaster.clone()
    }

    pub fn chaos(&self) -> ChaosEngine {
        self.chaos.clone()
    }

    pub fn advisor(&self) -> Arc<PredictionAdvisor> {
        self.advisor.clone()
    }

    pub fn metrics(&self) -> Option<SharedRegistry> {
        self.metrics_registry.clone()
    }

    /// Stop the drift loop and cancel pending chaos expiries.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown.send(true);
        self.drift_task
            .await
            .context("drift loop task failed to join")?;
        info!("simulation runtime shutdown complete");
        Ok(())
    }
}
