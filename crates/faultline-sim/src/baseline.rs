//! ---
//! fl_section: "02-simulation"
//! fl_subsection: "module"
//! fl_type: "source"
//! fl_scope: "code"
//! fl_description: "Randomised healthy baseline used for recovery."
//! fl_version: "v0.1.0"
//! fl_owner: "sre-platform"
//! ---
use std::ops::Range;

use rand::Rng;

use crate::model::{Service, Status};

pub const CPU: Range<f64> = 30.0..45.0;
pub const MEMORY: Range<f64> = 35.0..50.0;
pub const LATENCY_MS: Range<u32> = 100..200;
pub const AVAILABILITY: Range<f64> = 99.5..100.0;
pub const ERROR_RATE: Range<f64> = 0.0..0.5;
pub const THROUGHPUT: Range<u32> = 100..150;

/// Overwrite every metric with an independent uniform draw from the healthy
/// ranges, clear any chaos, and mark the service healthy.
pub fn restore<R: Rng>(service: &mut Service, rng: &mut R) {
    service.cpu = rng.gen_range(CPU);
    service.memory = rng.gen_range(MEMORY);
    service.latency = rng.gen_range(LATENCY_MS);
    service.availability = rng.gen_range(AVAILABILITY);
    service.error_rate = rng.gen_range(ERROR_RATE);
    service.throughput = rng.gen_range(THROUGHPUT);
    service.status = Status::Healthy;
    service.active_chaos = None;
}

/// True when every metric lies inside the healthy baseline ranges.
pub fn contains(service: &Service) -> bool {
    CPU.contains(&service.cpu)
        && MEMORY.contains(&service.memory)
        && LATENCY_MS.contains(&service.latency)
        && AVAILABILITY.contains(&service.availability)
        && ERROR_RATE.contains(&service.error_rate)
        && THROUGHPUT.contains(&service.throughput)
}
