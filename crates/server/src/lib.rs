//! HTTP façade of the media hub.
//!
//! The binary in `main.rs` wires configuration into an [`state::AppState`] and
//! serves [`api::create_router`]; integration tests drive the same router
//! in-process.

pub mod api;
pub mod metrics;
pub mod state;
