//! ---
//! fl_section: "04-resilience"
//! fl_subsection: "module"
//! fl_type: "source"
//! fl_scope: "code"
//! fl_description: "Chaos injection state machine with scheduled expiry."
//! fl_version: "v0.1.0"
//! fl_owner: "sre-platform"
//! ---
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use faultline_common::time::{deadline_after, unix_now};
use faultline_sim::{Chaos, FaultKind, Service, ServiceRegistry, SnapshotBroadcaster};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::metrics::ChaosMetrics;

const CPU_SPIKE_DELTA: f64 = 30.0;
const CPU_SPIKE_CEILING: f64 = 95.0;
const CPU_SPIKE_LATENCY_MS: u32 = 200;
const MEMORY_LEAK_DELTA: f64 = 40.0;
const MEMORY_LEAK_CEILING: f64 = 95.0;
const MEMORY_LEAK_ERROR_DELTA: f64 = 10.0;
const MEMORY_LEAK_ERROR_CEILING: f64 = 50.0;
const NETWORK_LATENCY_MS: u32 = 1000;
const NETWORK_AVAILABILITY_DROP: f64 = 20.0;
const NETWORK_AVAILABILITY_FLOOR: f64 = 50.0;
const KILLED_LATENCY_MS: u32 = 9999;

/// Body of an injection request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChaosRequest {
    /// Registry identifier of the target service.
    pub target_service: String,
    /// Fault to inject; unknown names are accepted and have no metric effect.
    pub chaos_type: FaultKind,
    /// Seconds until the fault expires.
    pub duration: u64,
}

/// Errors raised by the chaos engine.
#[derive(Debug, thiserror::Error)]
pub enum ChaosError {
    /// The target service is not part of the registry.
    #[error("service '{0}' not found")]
    NotFound(String),
}

/// Apply the one-time metric shift for `kind` and refresh the status.
///
/// `service_kill` forces the outage state and bypasses the classifier.
pub fn apply_fault(service: &mut Service, kind: &FaultKind) {
    match kind {
        FaultKind::CpuSpike => {
            service.cpu = (service.cpu + CPU_SPIKE_DELTA).min(CPU_SPIKE_CEILING);
            service.latency = service.latency.saturating_add(CPU_SPIKE_LATENCY_MS);
        }
        FaultKind::MemoryLeak => {
            service.memory = (service.memory + MEMORY_LEAK_DELTA).min(MEMORY_LEAK_CEILING);
            service.error_rate =
                (service.error_rate + MEMORY_LEAK_ERROR_DELTA).min(MEMORY_LEAK_ERROR_CEILING);
        }
        FaultKind::NetworkLatency => {
            service.latency = service.latency.saturating_add(NETWORK_LATENCY_MS);
            service.availability =
                (service.availability - NETWORK_AVAILABILITY_DROP).max(NETWORK_AVAILABILITY_FLOOR);
        }
        FaultKind::ServiceKill => {
            service.force_down();
            service.latency = KILLED_LATENCY_MS;
            return;
        }
        FaultKind::Unknown(_) => {}
    }
    service.reclassify();
}

#[derive(Debug)]
struct EngineInner {
    registry: Arc<ServiceRegistry>,
    broadcaster: Arc<SnapshotBroadcaster>,
    shutdown: watch::Receiver<bool>,
    next_id: AtomicU64,
    metrics: Option<ChaosMetrics>,
}

impl EngineInner {
    fn expire(&self, service_id: &str, chaos_id: u64) -> bool {
        let cleared = self.registry.write(|table| {
            let current = table
                .services()
                .get(service_id)
                .and_then(|service| service.active_chaos.as_ref())
                .map(|chaos| chaos.id);
            if current != Some(chaos_id) {
                return false;
            }
            table.reset_to_healthy(service_id).is_ok()
        });

        if cleared {
            info!(service = %service_id, "chaos expired; service restored to baseline");
            if let Some(metrics) = &self.metrics {
                metrics.inc_expiration();
            }
            self.broadcaster.broadcast(&self.registry);
        } else {
            debug!(service = %service_id, chaos_id, "stale chaos timer ignored");
        }
        cleared
    }
}

/// Injects faults into the registry and clears them once they expire.
///
/// Cloning the engine is cheap; all clones share the same registry and id
/// sequence.
#[derive(Debug, Clone)]
pub struct ChaosEngine {
    inner: Arc<EngineInner>,
}

impl ChaosEngine {
    /// Build an engine whose pending expiries are cancelled when `shutdown`
    /// flips to `true` or its sender is dropped.
    pub fn new(
        registry: Arc<ServiceRegistry>,
        broadcaster: Arc<SnapshotBroadcaster>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self::build(registry, broadcaster, shutdown, None)
    }

    /// Variant of [`ChaosEngine::new`] that records chaos metrics.
    pub fn with_metrics(
        registry: Arc<ServiceRegistry>,
        broadcaster: Arc<SnapshotBroadcaster>,
        shutdown: watch::Receiver<bool>,
        metrics: ChaosMetrics,
    ) -> Self {
        Self::build(registry, broadcaster, shutdown, Some(metrics))
    }

    fn build(
        registry: Arc<ServiceRegistry>,
        broadcaster: Arc<SnapshotBroadcaster>,
        shutdown: watch::Receiver<bool>,
        metrics: Option<ChaosMetrics>,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                registry,
                broadcaster,
                shutdown,
                next_id: AtomicU64::new(1),
                metrics,
            }),
        }
    }

    /// Registry the engine mutates.
    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.inner.registry
    }

    /// Attach a fault to a service, apply its metric shift, broadcast, and
    /// schedule its expiry. Must be called from within a tokio runtime.
    ///
    /// A new injection on a service replaces the previous one; the replaced
    /// injection's timer becomes a no-op.
    pub fn inject(&self, request: ChaosRequest) -> Result<Chaos, ChaosError> {
        let ChaosRequest {
            target_service,
            chaos_type,
            duration,
        } = request;

        let lifetime = Duration::from_secs(duration);
        let started_at = unix_now();
        let chaos = Chaos {
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            kind: chaos_type,
            duration,
            started_at,
            end_time: deadline_after(started_at, lifetime),
        };

        let cascaded = self.inner.registry.write(|table| -> Result<usize, ChaosError> {
            let is_root = table.is_root(&target_service);
            let service = table
                .get_mut(&target_service)
                .ok_or_else(|| ChaosError::NotFound(target_service.clone()))?;
            service.active_chaos = Some(chaos.clone());
            apply_fault(service, &chaos.kind);

            if chaos.kind == FaultKind::ServiceKill && is_root {
                Ok(table.cascade_outage(&target_service))
            } else {
                Ok(0)
            }
        })?;

        warn!(
            service = %target_service,
            fault = %chaos.kind,
            duration_s = duration,
            cascaded,
            "chaos injected"
        );
        if let Some(metrics) = &self.inner.metrics {
            metrics.inc_injection(chaos.kind.metric_label());
        }

        self.inner.broadcaster.broadcast(&self.inner.registry);
        self.schedule_expiry(target_service, chaos.id, lifetime);
        Ok(chaos)
    }

    /// Clear `chaos_id` from `service_id` and restore the baseline, unless the
    /// service now carries a different injection. Returns whether anything
    /// was cleared.
    pub fn expire(&self, service_id: &str, chaos_id: u64) -> bool {
        self.inner.expire(service_id, chaos_id)
    }

    /// Clear every fault and restore every service; broadcasts once.
    pub fn reset_all(&self) {
        self.inner.registry.reset_all();
        info!("all services reset to baseline");
        if let Some(metrics) = &self.inner.metrics {
            metrics.inc_reset();
        }
        self.inner.broadcaster.broadcast(&self.inner.registry);
    }

    fn schedule_expiry(&self, service_id: String, chaos_id: u64, after: Duration) {
        let inner = Arc::clone(&self.inner);
        let mut shutdown = self.inner.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = sleep(after) => {
                    inner.expire(&service_id, chaos_id);
                }
                _ = wait_for_shutdown(&mut shutdown) => {
                    debug!(service = %service_id, chaos_id, "chaos expiry cancelled by shutdown");
                }
            }
        });
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
