//! ---
//! fl_section: "02-simulation"
//! fl_subsection: "module"
//! fl_type: "source"
//! fl_scope: "code"
//! fl_description: "Service, status, and chaos data model."
//! fl_version: "v0.1.0"
//! fl_owner: "sre-platform"
//! ---
use std::fmt;

use faultline_common::config::ServiceSeed;
use serde::{Deserialize, Serialize};

use crate::classifier::classify;

/// Health status derived from a service's metrics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Healthy,
    Degraded,
    Down,
}

impl Status {
    /// Represent the status as a static label for metrics and payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Healthy => "healthy",
            Status::Degraded => "degraded",
            Status::Down => "down",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fault types understood by the chaos engine.
///
/// Unrecognised names are preserved in [`FaultKind::Unknown`] so the request
/// is still recorded even though it has no metric effect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    CpuSpike,
    MemoryLeak,
    NetworkLatency,
    ServiceKill,
    #[serde(untagged)]
    Unknown(String),
}

impl FaultKind {
    pub fn as_str(&self) -> &str {
        match self {
            FaultKind::CpuSpike => "cpu_spike",
            FaultKind::MemoryLeak => "memory_leak",
            FaultKind::NetworkLatency => "network_latency",
            FaultKind::ServiceKill => "service_kill",
            FaultKind::Unknown(name) => name,
        }
    }

    /// Bounded label safe for metric cardinality.
    pub fn metric_label(&self) -> &'static str {
        match self {
            FaultKind::CpuSpike => "cpu_spike",
            FaultKind::MemoryLeak => "memory_leak",
            FaultKind::NetworkLatency => "network_latency",
            FaultKind::ServiceKill => "service_kill",
            FaultKind::Unknown(_) => "unknown",
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Active fault attached to exactly one service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chaos {
    /// Engine-assigned sequence number; a newer injection always has a larger id.
    #[serde(skip)]
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: FaultKind,
    /// Duration in seconds.
    pub duration: u64,
    /// Unix seconds at injection.
    pub started_at: i64,
    /// Unix seconds after which the fault is over.
    pub end_time: i64,
}

/// One simulated microservice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Service {
    pub name: String,
    pub cpu: f64,
    pub memory: f64,
    pub latency: u32,
    pub availability: f64,
    pub error_rate: f64,
    pub throughput: u32,
    pub status: Status,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_chaos: Option<Chaos>,
}

impl Service {
    /// Build a service from its configured seed, classifying the initial metrics.
    pub fn from_seed(seed: &ServiceSeed) -> Self {
        let mut service = Self {
            name: seed.name.clone(),
            cpu: seed.cpu,
            memory: seed.memory,
            latency: seed.latency,
            availability: seed.availability,
            error_rate: seed.error_rate,
            throughput: seed.throughput,
            status: Status::Healthy,
            dependencies: seed.dependencies.clone(),
            active_chaos: None,
        };
        service.reclassify();
        service
    }

    /// Recompute `status` from the current metrics.
    pub fn reclassify(&mut self) {
        self.status = classify(self);
    }

    /// Force the outage state used by `service_kill` and its cascade.
    pub fn force_down(&mut self) {
        self.status = Status::Down;
        self.availability = 0.0;
        self.error_rate = 100.0;
    }

    pub fn is_faulted(&self) -> bool {
        self.active_chaos.is_some()
    }
}
