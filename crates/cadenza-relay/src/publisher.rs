//! Transactional event publishing.

use cadenza_core::events::{EventEnvelope, EventPayload};
use cadenza_core::AppError;
use cadenza_db::OutboxRepository;
use sqlx::{Postgres, Transaction};

/// Writes events to the outbox. `publish_tx` joins the caller's
/// transaction (mutation + event commit together); `publish` opens its
/// own, for handlers whose only mutation is the event itself.
#[derive(Clone)]
pub struct EventPublisher {
    outbox: OutboxRepository,
}

impl EventPublisher {
    pub fn new(outbox: OutboxRepository) -> Self {
        Self { outbox }
    }

    /// Enqueue within the caller's transaction. Call [`EventPublisher::notify`]
    /// after the commit to wake the relay early.
    pub async fn publish_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        payload: EventPayload,
    ) -> Result<EventEnvelope, AppError> {
        let envelope = EventEnvelope::new(payload);
        self.outbox.enqueue_tx(tx, &envelope).await?;
        tracing::debug!(
            event_id = %envelope.id,
            event_type = %envelope.kind(),
            "Event written to outbox"
        );
        Ok(envelope)
    }

    /// Enqueue and commit in one step, then wake the relay.
    pub async fn publish(&self, payload: EventPayload) -> Result<EventEnvelope, AppError> {
        let mut tx = self.outbox.pool().begin().await?;
        let envelope = self.publish_tx(&mut tx, payload).await?;
        tx.commit().await?;
        self.notify().await;
        Ok(envelope)
    }

    /// Post-commit relay wake-up; best-effort.
    pub async fn notify(&self) {
        self.outbox.notify().await;
    }
}
