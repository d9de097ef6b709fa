//! ---
//! fl_section: "02-simulation"
//! fl_subsection: "module"
//! fl_type: "source"
//! fl_scope: "code"
//! fl_description: "Fan-out of registry snapshots to streaming subscribers."
//! fl_version: "v0.1.0"
//! fl_owner: "sre-platform"
//! ---
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use faultline_metrics::SimulationMetrics;
use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::registry::{encode_snapshot, RegistryError, ServiceRegistry};

/// Pushes full registry snapshots to every registered subscriber.
///
/// Each subscriber owns a bounded queue. A push that finds the queue full or
/// closed drops that subscriber; the rest of the fan-out is unaffected.
#[derive(Debug)]
pub struct SnapshotBroadcaster {
    subscribers: Mutex<IndexMap<u64, mpsc::Sender<Bytes>>>,
    next_id: AtomicU64,
    capacity: usize,
    metrics: Option<SimulationMetrics>,
}

impl SnapshotBroadcaster {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(IndexMap::new()),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: SimulationMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Register a subscriber and queue the current snapshot as its first payload.
    ///
    /// Registration happens under the registry read lock, so no broadcast can
    /// slip in between the initial snapshot and the subscription.
    pub fn subscribe(&self, registry: &ServiceRegistry) -> Result<Subscription, RegistryError> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let count = registry.read(|services| -> Result<usize, RegistryError> {
            let payload = encode_snapshot(services)?;
            // A fresh queue with capacity >= 1 always accepts the first payload.
            let _ = tx.try_send(payload);
            let mut subscribers = self.subscribers.lock();
            subscribers.insert(id, tx);
            Ok(subscribers.len())
        })?;

        if let Some(metrics) = &self.metrics {
            metrics.set_subscribers(count);
        }
        debug!(subscriber = id, "subscriber registered");
        Ok(Subscription { id, rx })
    }

    /// Encode the current registry state once and push it to every subscriber.
    ///
    /// Returns the number of subscribers that accepted the payload.
    pub fn broadcast(&self, registry: &ServiceRegistry) -> usize {
        let outcome = registry.read(|services| {
            let payload = match encode_snapshot(services) {
                Ok(payload) => payload,
                Err(err) => {
                    warn!(error = %err, "failed to encode snapshot; broadcast skipped");
                    return None;
                }
            };

            let mut subscribers = self.subscribers.lock();
            let mut removed = Vec::new();
            subscribers.retain(|id, tx| match tx.try_send(payload.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!(subscriber = *id, "subscriber queue full; dropping subscriber");
                    removed.push("full");
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(subscriber = *id, "subscriber closed; dropping subscriber");
                    removed.push("closed");
                    false
                }
            });
            Some((subscribers.len(), removed))
        });

        let Some((delivered, removed)) = outcome else {
            return 0;
        };

        if let Some(metrics) = &self.metrics {
            metrics.inc_broadcast();
            for reason in &removed {
                metrics.record_subscriber_removal(reason);
            }
            metrics.set_subscribers(delivered);
        }
        delivered
    }
}

/// Receiving end of a subscriber queue.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Bytes>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next snapshot payload, or `None` once the broadcaster dropped this subscriber.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Bytes> {
        self.rx.try_recv().ok()
    }
}
