//! Deletion cleanup saga: removes all derived artifacts for a song.
//!
//! Every step is best-effort and idempotent: an absent object counts as
//! success, a failed delete is logged and skipped. There is no rollback;
//! retry comes only from redelivery of the triggering event, which
//! reissues the same idempotent deletes.

use async_trait::async_trait;
use cadenza_core::events::{EventEnvelope, EventKind, EventPayload};
use cadenza_core::HandlerError;
use cadenza_db::MediaFileRepository;
use cadenza_relay::EventHandler;
use cadenza_storage::ObjectStorage;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct CleanupConfig {
    pub hls_bucket: String,
    pub covers_bucket: String,
}

pub struct MediaCleanup {
    media_files: MediaFileRepository,
    storage: Arc<dyn ObjectStorage>,
    config: CleanupConfig,
}

impl MediaCleanup {
    pub fn new(
        media_files: MediaFileRepository,
        storage: Arc<dyn ObjectStorage>,
        config: CleanupConfig,
    ) -> Self {
        Self {
            media_files,
            storage,
            config,
        }
    }

    async fn cleanup(&self, song_id: Uuid) -> Result<(), HandlerError> {
        tracing::info!(song_id = %song_id, "Cleaning up media for deleted song");

        // Raw objects, then the rows. Database failures are transient and
        // re-delivered; storage failures are logged and skipped.
        let media_files = self.media_files.list_by_song(song_id).await?;
        for file in &media_files {
            if let Err(e) = self
                .storage
                .delete_object(&file.bucket, &file.storage_key)
                .await
            {
                tracing::warn!(
                    error = %e,
                    bucket = %file.bucket,
                    storage_key = %file.storage_key,
                    "Failed to delete raw object, continuing"
                );
            }
        }
        if !media_files.is_empty() {
            let removed = self.media_files.delete_by_song(song_id).await?;
            tracing::info!(song_id = %song_id, rows = removed, "Media file rows removed");
        }

        // Whole derived-stream directory: list the prefix, bulk delete.
        if let Err(e) = self
            .storage
            .delete_prefix(&self.config.hls_bucket, &format!("hls/{}", song_id))
            .await
        {
            tracing::warn!(error = %e, song_id = %song_id, "Failed to delete HLS prefix, continuing");
        }

        // Covers may exist under either extension convention.
        for ext in ["jpg", "png"] {
            let key = format!("covers/{}.{}", song_id, ext);
            if let Err(e) = self.storage.delete_object(&self.config.covers_bucket, &key).await {
                tracing::warn!(error = %e, key = %key, "Failed to delete cover variant, continuing");
            }
        }

        tracing::info!(song_id = %song_id, "Media cleanup finished");
        Ok(())
    }
}

#[async_trait]
impl EventHandler for MediaCleanup {
    fn name(&self) -> &'static str {
        "media-cleanup"
    }

    fn subscriptions(&self) -> &'static [EventKind] {
        &[EventKind::SongDeleted]
    }

    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), HandlerError> {
        let EventPayload::SongDeleted { song_id } = &envelope.payload else {
            return Err(HandlerError::permanent(anyhow::anyhow!(
                "unexpected payload for media cleanup: {}",
                envelope.kind()
            )));
        };
        self.cleanup(*song_id).await
    }
}
