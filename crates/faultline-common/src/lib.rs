//! ---
//! fl_section: "01-core-functionality"
//! fl_subsection: "module"
//! fl_type: "source"
//! fl_scope: "code"
//! fl_description: "Shared primitives and utilities for the simulation runtime."
//! fl_version: "v0.1.0"
//! fl_owner: "sre-platform"
//! ---
//! Core shared primitives for the Faultline workspace.
//! This crate exposes configuration loading, tracing setup, and wall-clock
//! helpers consumed across the workspace.

pub mod config;
pub mod logging;
pub mod time;

pub use config::{
    ApiConfig, AppConfig, LoadedAppConfig, LoggingConfig, MetricsConfig, PredictorConfig,
    ServiceSeed, SimulationConfig, SloConfig, TopologyConfig,
};
pub use logging::{filter_directive, init_tracing, LogFormat};
