//! ---
//! fl_section: "04-resilience"
//! fl_subsection: "01-bootstrap"
//! fl_type: "source"
//! fl_scope: "code"
//! fl_description: "Chaos tooling module exports."
//! fl_version: "v0.1.0"
//! fl_owner: "sre-platform"
//! ---
//! Fault injection against the simulated service registry.
#![warn(missing_docs)]

pub mod chaos;
pub mod metrics;

pub use chaos::{apply_fault, ChaosEngine, ChaosError, ChaosRequest};
pub use metrics::ChaosMetrics;
