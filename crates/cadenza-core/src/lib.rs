//! Core domain types for Cadenza: entities, integration events,
//! configuration, and error types shared by every other crate.

pub mod config;
pub mod error;
pub mod events;
pub mod handler_error;
pub mod models;

pub use config::Config;
pub use error::AppError;
pub use events::{EventEnvelope, EventKind, EventPayload};
pub use handler_error::{HandlerError, HandlerResultExt};
