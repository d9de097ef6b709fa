//! ---
//! fl_section: "02-simulation"
//! fl_subsection: "module"
//! fl_type: "source"
//! fl_scope: "code"
//! fl_description: "Background metric drift for healthy, unfaulted services."
//! fl_version: "v0.1.0"
//! fl_owner: "sre-platform"
//! ---
use std::sync::Arc;
use std::time::Duration;

use faultline_metrics::SimulationMetrics;
use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use crate::broadcast::SnapshotBroadcaster;
use crate::model::{Service, Status};
use crate::registry::ServiceRegistry;

const CPU_STEP: f64 = 1.0;
const CPU_BOUNDS: (f64, f64) = (10.0, 100.0);
const MEMORY_STEP: f64 = 0.75;
const MEMORY_BOUNDS: (f64, f64) = (20.0, 100.0);
const LATENCY_STEP_MS: i64 = 5;
const LATENCY_BOUNDS_MS: (i64, i64) = (50, 2000);

/// Apply one random perturbation step to a service and reclassify it.
pub fn drift_service<R: Rng>(service: &mut Service, rng: &mut R) {
    service.cpu =
        (service.cpu + rng.gen_range(-CPU_STEP..CPU_STEP)).clamp(CPU_BOUNDS.0, CPU_BOUNDS.1);
    service.memory = (service.memory + rng.gen_range(-MEMORY_STEP..MEMORY_STEP))
        .clamp(MEMORY_BOUNDS.0, MEMORY_BOUNDS.1);
    let latency = i64::from(service.latency) + rng.gen_range(-LATENCY_STEP_MS..=LATENCY_STEP_MS);
    // Bounds fit in u32.
    service.latency = latency.clamp(LATENCY_BOUNDS_MS.0, LATENCY_BOUNDS_MS.1) as u32;
    service.reclassify();
}

/// Outcome of a single drift tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriftReport {
    pub drifted: usize,
    pub skipped: usize,
    pub delivered: usize,
}

/// Periodically drifts every eligible service and broadcasts once per tick.
#[derive(Debug)]
pub struct DriftSimulator {
    registry: Arc<ServiceRegistry>,
    broadcaster: Arc<SnapshotBroadcaster>,
    interval: Duration,
    metrics: Option<SimulationMetrics>,
}

impl DriftSimulator {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        broadcaster: Arc<SnapshotBroadcaster>,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            broadcaster,
            interval,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: SimulationMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one drift pass followed by exactly one broadcast.
    pub fn tick(&self) -> DriftReport {
        let (drifted, skipped) = self.registry.write(|table| {
            let (services, rng) = table.split_mut();
            let mut drifted = 0;
            let mut skipped = 0;
            for service in services.values_mut() {
                if service.is_faulted() || service.status == Status::Down {
                    skipped += 1;
                    continue;
                }
                drift_service(service, rng);
                drifted += 1;
            }
            (drifted, skipped)
        });

        let delivered = self.broadcaster.broadcast(&self.registry);
        if let Some(metrics) = &self.metrics {
            metrics.inc_drift_tick();
        }
        DriftReport {
            drifted,
            skipped,
            delivered,
        }
    }

    /// Spawn the drift loop; it exits once `shutdown` flips to `true` or its
    /// sender is dropped.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval_at(time::Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_ms = self.interval.as_millis() as u64, "drift loop started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = self.tick();
                        debug!(
                            drifted = report.drifted,
                            skipped = report.skipped,
                            delivered = report.delivered,
                            "drift tick complete"
                        );
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("drift loop stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Chaos, FaultKind};
    use faultline_common::config::TopologyConfig;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn fixture() -> (Arc<ServiceRegistry>, Arc<SnapshotBroadcaster>) {
        let registry = Arc::new(ServiceRegistry::from_topology(
            &TopologyConfig::default(),
            Some(21),
        ));
        (registry, Arc::new(SnapshotBroadcaster::new(8)))
    }

    #[test]
    fn drift_stays_within_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut service = Service {
            name: "edge".into(),
            cpu: 10.2,
            memory: 99.9,
            latency: 52,
            availability: 99.9,
            error_rate: 0.1,
            throughput: 100,
            status: Status::Healthy,
            dependencies: Vec::new(),
            active_chaos: None,
        };
        for _ in 0..1_000 {
            let before = service.clone();
            drift_service(&mut service, &mut rng);
            assert!((10.0..=100.0).contains(&service.cpu));
            assert!((20.0..=100.0).contains(&service.memory));
            assert!((50..=2000).contains(&service.latency));
            assert!((service.cpu - before.cpu).abs() <= 1.0);
            assert!((service.memory - before.memory).abs() <= 0.75);
            assert!(service.latency.abs_diff(before.latency) <= 5);
            assert_eq!(service.availability, before.availability);
        }
    }

    #[test]
    fn tick_skips_faulted_and_down_services() {
        let (registry, broadcaster) = fixture();
        registry.write(|table| {
            let auth = table.get_mut("auth-service").unwrap();
            auth.active_chaos = Some(Chaos {
                id: 1,
                kind: FaultKind::CpuSpike,
                duration: 30,
                started_at: 0,
                end_time: 30,
            });
            table.get_mut("database").unwrap().force_down();
        });
        let auth_before = registry.get("auth-service").unwrap();
        let database_before = registry.get("database").unwrap();

        let drift = DriftSimulator::new(registry.clone(), broadcaster, Duration::from_secs(2));
        let report = drift.tick();

        assert_eq!(report.drifted, 2);
        assert_eq!(report.skipped, 2);
        assert_eq!(registry.get("auth-service").unwrap(), auth_before);
        assert_eq!(registry.get("database").unwrap(), database_before);
    }

    #[test]
    fn tick_broadcasts_exactly_once() {
        let (registry, broadcaster) = fixture();
        let mut subscription = broadcaster.subscribe(&registry).unwrap();
        subscription.try_recv().unwrap();

        let drift = DriftSimulator::new(registry.clone(), broadcaster, Duration::from_secs(2));
        let report = drift.tick();

        assert_eq!(report.delivered, 1);
        assert_eq!(
            subscription.try_recv().unwrap(),
            registry.encode_snapshot().unwrap()
        );
        assert!(subscription.try_recv().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_loop_ticks_on_interval_and_stops() {
        let (registry, broadcaster) = fixture();
        let mut subscription = broadcaster.subscribe(&registry).unwrap();
        subscription.try_recv().unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = DriftSimulator::new(registry, broadcaster, Duration::from_secs(2))
            .spawn(shutdown_rx);

        time::sleep(Duration::from_millis(1_500)).await;
        assert!(subscription.try_recv().is_none());

        assert!(subscription.recv().await.is_some());
        assert!(subscription.recv().await.is_some());

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
