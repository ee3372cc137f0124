//! Media file status projection from worker outcomes.
//!
//! The worker never touches media rows directly; files move through
//! Processing/Ready/Failed only in reaction to its events. Every update is
//! a guarded SQL transition, so duplicates and out-of-order deliveries
//! are no-ops.

use async_trait::async_trait;
use cadenza_core::events::{EventEnvelope, EventKind, EventPayload};
use cadenza_core::HandlerError;
use cadenza_db::MediaFileRepository;
use cadenza_relay::EventHandler;

pub struct MediaStatusProjector {
    media_files: MediaFileRepository,
}

impl MediaStatusProjector {
    pub fn new(media_files: MediaFileRepository) -> Self {
        Self { media_files }
    }
}

#[async_trait]
impl EventHandler for MediaStatusProjector {
    fn name(&self) -> &'static str {
        "media-status-projector"
    }

    fn subscriptions(&self) -> &'static [EventKind] {
        &[
            EventKind::MediaUploaded,
            EventKind::MediaProcessed,
            EventKind::MediaProcessingFailed,
        ]
    }

    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), HandlerError> {
        match &envelope.payload {
            EventPayload::MediaUploaded { song_id, .. } => {
                let n = self.media_files.mark_processing_by_song(*song_id).await?;
                tracing::debug!(song_id = %song_id, files = n, "Media files marked processing");
            }
            EventPayload::MediaProcessed { song_id, .. } => {
                let n = self.media_files.mark_ready_by_song(*song_id).await?;
                tracing::info!(song_id = %song_id, files = n, "Media files marked ready");
            }
            EventPayload::MediaProcessingFailed { song_id, reason } => {
                let n = self.media_files.mark_failed_by_song(*song_id).await?;
                tracing::error!(
                    song_id = %song_id,
                    files = n,
                    reason = %reason,
                    "Media files marked failed"
                );
            }
            other => {
                return Err(HandlerError::permanent(anyhow::anyhow!(
                    "unexpected payload for media status projector: {}",
                    other.kind()
                )));
            }
        }
        Ok(())
    }
}
