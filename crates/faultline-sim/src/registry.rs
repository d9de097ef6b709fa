//! ---
//! fl_section: "02-simulation"
//! fl_subsection: "module"
//! fl_type: "source"
//! fl_scope: "code"
//! fl_description: "Synchronised service registry shared by every mutator and reader."
//! fl_version: "v0.1.0"
//! fl_owner: "sre-platform"
//! ---
use bytes::Bytes;
use faultline_common::config::TopologyConfig;
use faultline_metrics::SimulationMetrics;
use indexmap::IndexMap;
use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use crate::baseline;
use crate::model::Service;

/// Identifier → service mapping in topology declaration order.
pub type ServiceMap = IndexMap<String, Service>;

/// Errors raised by registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("service '{0}' not found")]
    NotFound(String),
    #[error("failed to encode registry snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Serialise a service map into the wire snapshot format.
pub fn encode_snapshot(services: &ServiceMap) -> Result<Bytes, RegistryError> {
    Ok(Bytes::from(serde_json::to_vec(services)?))
}

/// Mutable view of the registry handed out while the write lock is held.
#[derive(Debug)]
pub struct ServiceTable {
    services: ServiceMap,
    root: Option<String>,
    rng: StdRng,
}

impl ServiceTable {
    pub fn services(&self) -> &ServiceMap {
        &self.services
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Service> {
        self.services.get_mut(id)
    }

    /// Borrow the services and the simulation RNG at the same time.
    pub fn split_mut(&mut self) -> (&mut ServiceMap, &mut StdRng) {
        (&mut self.services, &mut self.rng)
    }

    pub fn root_dependency(&self) -> Option<&str> {
        self.root.as_deref()
    }

    pub fn is_root(&self, id: &str) -> bool {
        self.root.as_deref() == Some(id)
    }

    /// Force every service except `origin` into the outage state. Chaos records
    /// and the remaining metrics are left untouched.
    pub fn cascade_outage(&mut self, origin: &str) -> usize {
        let mut affected = 0;
        for (id, service) in self.services.iter_mut() {
            if id != origin {
                service.force_down();
                affected += 1;
            }
        }
        affected
    }

    /// Restore one service to a random healthy baseline. Resetting the root
    /// dependency also restores every other service; no other service fans out.
    pub fn reset_to_healthy(&mut self, id: &str) -> Result<(), RegistryError> {
        let service = self
            .services
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_owned()))?;
        baseline::restore(service, &mut self.rng);

        if self.is_root(id) {
            for (other, service) in self.services.iter_mut() {
                if other != id {
                    baseline::restore(service, &mut self.rng);
                }
            }
            debug!(root = %id, "root dependency reset; dependents restored");
        }
        Ok(())
    }

    /// Restore every service to a random healthy baseline.
    pub fn reset_all(&mut self) {
        for service in self.services.values_mut() {
            baseline::restore(service, &mut self.rng);
        }
    }
}

/// Process-wide registry of simulated services.
///
/// A single read/write lock guards the whole map together with the RNG used
/// for drift and baseline draws, so every mutation is applied atomically.
#[derive(Debug)]
pub struct ServiceRegistry {
    root: Option<String>,
    table: RwLock<ServiceTable>,
    metrics: Option<SimulationMetrics>,
}

impl ServiceRegistry {
    pub fn new(services: ServiceMap, root: Option<String>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            root: root.clone(),
            table: RwLock::new(ServiceTable {
                services,
                root,
                rng,
            }),
            metrics: None,
        }
    }

    /// Build the registry from a validated topology.
    pub fn from_topology(topology: &TopologyConfig, seed: Option<u64>) -> Self {
        let services = topology
            .services
            .iter()
            .map(|(id, seed)| (id.clone(), Service::from_seed(seed)))
            .collect();
        Self::new(services, topology.root_dependency.clone(), seed)
    }

    /// Publish per-service status gauges after each write.
    pub fn with_metrics(mut self, metrics: SimulationMetrics) -> Self {
        {
            let table = self.table.read();
            publish_status(&metrics, &table.services);
        }
        self.metrics = Some(metrics);
        self
    }

    pub fn root_dependency(&self) -> Option<&str> {
        self.root.as_deref()
    }

    pub fn len(&self) -> usize {
        self.table.read().services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.read().services.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.table.read().services.contains_key(id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.table.read().services.keys().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<Service> {
        self.table.read().services.get(id).cloned()
    }

    /// Owned copy of the whole map.
    pub fn snapshot(&self) -> ServiceMap {
        self.table.read().services.clone()
    }

    /// Serialised snapshot, identical to what subscribers receive.
    pub fn encode_snapshot(&self) -> Result<Bytes, RegistryError> {
        self.read(encode_snapshot)
    }

    /// Run `f` against the map while holding the read lock.
    pub fn read<R>(&self, f: impl FnOnce(&ServiceMap) -> R) -> R {
        let table = self.table.read();
        f(&table.services)
    }

    /// Run `f` against the table while holding the write lock.
    pub fn write<R>(&self, f: impl FnOnce(&mut ServiceTable) -> R) -> R {
        let mut table = self.table.write();
        let result = f(&mut table);
        if let Some(metrics) = &self.metrics {
            publish_status(metrics, &table.services);
        }
        result
    }

    pub fn reset_to_healthy(&self, id: &str) -> Result<(), RegistryError> {
        self.write(|table| table.reset_to_healthy(id))
    }

    pub fn reset_all(&self) {
        self.write(ServiceTable::reset_all)
    }
}

fn publish_status(metrics: &SimulationMetrics, services: &ServiceMap) {
    for (id, service) in services {
        metrics.set_service_status(id, service.status.as_str());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::classify;
    use crate::model::Status;

    fn registry() -> ServiceRegistry {
        ServiceRegistry::from_topology(&TopologyConfig::default(), Some(3))
    }

    #[test]
    fn topology_seeds_are_classified() {
        let registry = registry();
        assert_eq!(registry.len(), 4);
        assert_eq!(registry.root_dependency(), Some("database"));
        registry.read(|services| {
            for service in services.values() {
                assert_eq!(service.status, classify(service));
            }
        });
    }

    #[test]
    fn snapshot_bytes_match_serialised_map() {
        let registry = registry();
        let bytes = registry.encode_snapshot().unwrap();
        let expected = serde_json::to_vec(&registry.snapshot()).unwrap();
        assert_eq!(bytes.as_ref(), expected.as_slice());
    }

    #[test]
    fn resetting_unknown_service_is_not_found() {
        let err = registry().reset_to_healthy("cache").unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(id) if id == "cache"));
    }

    #[test]
    fn root_reset_restores_dependents() {
        let registry = registry();
        registry.write(|table| {
            let affected = table.cascade_outage("database");
            assert_eq!(affected, 3);
        });
        registry.reset_to_healthy("database").unwrap();
        registry.read(|services| {
            for service in services.values() {
                assert_eq!(service.status, Status::Healthy);
                assert!(baseline::contains(service));
            }
        });
    }

    #[test]
    fn leaf_reset_does_not_fan_out() {
        let registry = registry();
        registry.write(|table| table.cascade_outage("database"));
        registry.reset_to_healthy("auth-service").unwrap();
        let auth = registry.get("auth-service").unwrap();
        assert_eq!(auth.status, Status::Healthy);
        let gateway = registry.get("api-gateway").unwrap();
        assert_eq!(gateway.status, Status::Down);
        let database = registry.get("database").unwrap();
        assert_eq!(database.cpu, 40.0);
    }

    #[test]
    fn status_metrics_follow_writes() {
        let metrics_registry = faultline_metrics::new_registry();
        let metrics = SimulationMetrics::new(metrics_registry.clone()).unwrap();
        let registry = registry().with_metrics(metrics);
        registry.write(|table| table.cascade_outage("database"));

        let family = metrics_registry
            .gather()
            .into_iter()
            .find(|family| family.get_name() == "faultline_service_status")
            .unwrap();
        let gateway_down = family.get_metric().iter().any(|metric| {
            let labels = metric.get_label();
            labels.iter().any(|l| l.get_value() == "api-gateway")
                && labels.iter().any(|l| l.get_value() == "down")
                && metric.get_gauge().get_value() == 1.0
        });
        assert!(gateway_down);
    }
}
