//! ---
//! fl_section: "06-networking"
//! fl_subsection: "01-bootstrap"
//! fl_type: "source"
//! fl_scope: "code"
//! fl_description: "HTTP and WebSocket adapter exports."
//! fl_version: "v0.1.0"
//! fl_owner: "sre-platform"
//! ---
//! Thin axum adapter exposing the simulator over REST and WebSocket.

pub mod rest;
pub mod websocket;

pub use rest::{build_router, spawn_api_server, ApiServer, ApiState};
