//! ---
//! fl_section: "02-simulation"
//! fl_subsection: "module"
//! fl_type: "source"
//! fl_scope: "code"
//! fl_description: "Status classification rules."
//! fl_version: "v0.1.0"
//! fl_owner: "sre-platform"
//! ---
use crate::model::{Service, Status};

pub const DEGRADED_CPU: f64 = 90.0;
pub const DEGRADED_MEMORY: f64 = 90.0;
pub const DEGRADED_ERROR_RATE: f64 = 10.0;
pub const DEGRADED_LATENCY_MS: u32 = 1000;
pub const DOWN_ERROR_RATE: f64 = 100.0;

/// Derive the status of a service from its metrics.
///
/// Outage conditions take precedence over degradation conditions.
pub fn classify(service: &Service) -> Status {
    if service.availability <= 0.0 || service.error_rate >= DOWN_ERROR_RATE {
        Status::Down
    } else if service.cpu > DEGRADED_CPU
        || service.memory > DEGRADED_MEMORY
        || service.error_rate > DEGRADED_ERROR_RATE
        || service.latency > DEGRADED_LATENCY_MS
    {
        Status::Degraded
    } else {
        Status::Healthy
    }
}
