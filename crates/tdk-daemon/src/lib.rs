//! tdk-daemon library target.
//!
//! Exposes the router, state and API types; the binary `main.rs` wires them
//! to PostgreSQL and the notification stack. No business logic lives here —
//! every handler delegates to the lifecycle engine.

pub mod api_types;
pub mod routes;
pub mod state;
