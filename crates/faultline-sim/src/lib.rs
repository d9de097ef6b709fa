//! ---
//! fl_section: "02-simulation"
//! fl_subsection: "01-bootstrap"
//! fl_type: "source"
//! fl_scope: "code"
//! fl_description: "Simulation engine module exports and shared types."
//! fl_version: "v0.1.0"
//! fl_owner: "sre-platform"
//! ---
//! Service-state simulation for Faultline: the registry, status classifier,
//! drift loop and snapshot fan-out.

pub mod baseline;
pub mod broadcast;
pub mod classifier;
pub mod drift;
pub mod model;
pub mod registry;

pub use broadcast::{SnapshotBroadcaster, Subscription};
pub use classifier::classify;
pub use drift::{drift_service, DriftReport, DriftSimulator};
pub use model::{Chaos, FaultKind, Service, Status};
pub use registry::{encode_snapshot, RegistryError, ServiceMap, ServiceRegistry, ServiceTable};
