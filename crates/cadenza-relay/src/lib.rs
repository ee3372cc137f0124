//! Message relay: transactional publish plus at-least-once delivery.
//!
//! A state mutation and the event it implies commit together through the
//! outbox table; a separate relay worker drains the table and dispatches
//! to subscribed handlers, retrying with backoff on transient failures.
//! Delivery is at-least-once, so every handler must be idempotent.

pub mod handler;
pub mod publisher;
pub mod relay;

pub use handler::{EventHandler, HandlerRegistry};
pub use publisher::EventPublisher;
pub use relay::{process_next, DeadLetterHandler, EventRelay, RelayConfig};
