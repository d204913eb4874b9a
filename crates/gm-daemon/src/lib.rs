//! gm-daemon library target.
//!
//! Exposes the router, auth and state for integration tests.
//! The binary `main.rs` depends on this library target.

pub mod api_types;
pub mod auth;
pub mod routes;
pub mod state;
