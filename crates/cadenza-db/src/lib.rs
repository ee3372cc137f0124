//! PostgreSQL repositories.
//!
//! Queries are dynamic sqlx (no compile-time `DATABASE_URL` requirement).
//! Idempotency guards live in the SQL itself: guarded UPDATEs report via
//! `rows_affected` whether the transition actually happened, so duplicate
//! deliveries become no-ops instead of errors.

pub mod media_files;
pub mod outbox;
pub mod songs;

pub use media_files::MediaFileRepository;
pub use outbox::{OutboxEvent, OutboxRepository, OUTBOX_NOTIFY_CHANNEL};
pub use songs::SongRepository;
