//! Durable outbox table: the persistence half of the message relay.
//!
//! An event row is written in the same transaction as the state mutation
//! that implies it. The relay claims pending rows with
//! `FOR UPDATE SKIP LOCKED`, so concurrent relay workers never dispatch
//! the same row twice within one claim cycle; crash recovery is handled
//! by reaping stale `delivering` rows back to `pending`.

use cadenza_core::events::{EventEnvelope, EventPayload};
use cadenza_core::AppError;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

/// Channel name for PostgreSQL LISTEN/NOTIFY when an event is enqueued.
pub const OUTBOX_NOTIFY_CHANNEL: &str = "cadenza_outbox";

/// A claimed outbox row.
#[derive(Debug, Clone)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
    pub attempts: i32,
}

impl OutboxEvent {
    /// Reconstruct the envelope. A payload that no longer deserializes is
    /// a permanent failure for this row.
    pub fn envelope(&self) -> Result<EventEnvelope, serde_json::Error> {
        let payload: EventPayload = serde_json::from_value(self.payload.clone())?;
        Ok(EventEnvelope {
            id: self.id,
            occurred_at: self.occurred_at,
            payload,
        })
    }
}

#[derive(Clone)]
pub struct OutboxRepository {
    pool: PgPool,
}

impl OutboxRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Append an event within the caller's transaction. The event is
    /// never lost if the transaction commits and never delivered if it
    /// rolls back.
    pub async fn enqueue_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        envelope: &EventEnvelope,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO outbox_events (id, event_type, payload, occurred_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(envelope.id)
        .bind(envelope.kind().as_str())
        .bind(serde_json::to_value(&envelope.payload)?)
        .bind(envelope.occurred_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Wake the relay after a commit. Non-fatal: the relay also polls, so
    /// a failed notify only delays delivery.
    pub async fn notify(&self) {
        if let Err(e) = sqlx::query("SELECT pg_notify($1, '')")
            .bind(OUTBOX_NOTIFY_CHANNEL)
            .execute(&self.pool)
            .await
        {
            tracing::warn!(
                error = %e,
                "Failed to send pg_notify for outbox event, relay will discover it via polling"
            );
        }
    }

    /// Claim the next due pending event, moving it to `delivering`.
    pub async fn claim_next(&self) -> Result<Option<OutboxEvent>, AppError> {
        let row = sqlx::query(
            r#"
            UPDATE outbox_events
            SET status = 'delivering', delivering_since = NOW()
            WHERE id = (
                SELECT id FROM outbox_events
                WHERE status = 'pending' AND next_attempt_at <= NOW()
                ORDER BY next_attempt_at, created_at
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, event_type, payload, occurred_at, attempts
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| OutboxEvent {
            id: row.get("id"),
            event_type: row.get("event_type"),
            payload: row.get("payload"),
            occurred_at: row.get("occurred_at"),
            attempts: row.get("attempts"),
        }))
    }

    pub async fn mark_delivered(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE outbox_events
            SET status = 'delivered', delivering_since = NULL
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Put a failed delivery back on the queue with an incremented attempt
    /// count and a backoff delay.
    pub async fn reschedule(
        &self,
        id: Uuid,
        error: &str,
        backoff_secs: u64,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE outbox_events
            SET status = 'pending',
                delivering_since = NULL,
                attempts = attempts + 1,
                next_attempt_at = NOW() + make_interval(secs => $2),
                last_error = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(backoff_secs as f64)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn mark_dead(&self, id: Uuid, error: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE outbox_events
            SET status = 'dead', delivering_since = NULL, last_error = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Return events stuck in `delivering` (relay crash mid-dispatch) to
    /// `pending` after a grace period. At-least-once across restarts.
    pub async fn reap_stale_delivering(&self, grace_secs: i64) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_events
            SET status = 'pending', delivering_since = NULL
            WHERE status = 'delivering'
              AND delivering_since < NOW() - make_interval(secs => $1)
            "#,
        )
        .bind(grace_secs as f64)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
