//! ---
//! fl_section: "01-core-functionality"
//! fl_subsection: "01-bootstrap"
//! fl_type: "source"
//! fl_scope: "code"
//! fl_description: "Runtime orchestration exports."
//! fl_version: "v0.1.0"
//! fl_owner: "sre-platform"
//! ---

pub mod orchestrator;

pub use orchestrator::{RuntimeHandle, SimulationRuntime};
