//! Cadenza API: HTTP surface and service wiring.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod setup;
pub mod state;
pub mod telemetry;
