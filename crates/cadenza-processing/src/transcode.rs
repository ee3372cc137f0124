//! The transcoding worker: MediaUploaded → download → extract → convert →
//! upload → MediaProcessed.
//!
//! Delivery is at-least-once; the whole pipeline is safe to re-run for
//! the same event. Any failure propagates as transient so the relay's
//! redelivery policy governs retries.

use anyhow::Context;
use async_trait::async_trait;
use cadenza_core::events::{EventEnvelope, EventKind, EventPayload};
use cadenza_core::HandlerError;
use cadenza_relay::{EventHandler, EventPublisher};
use cadenza_storage::{keys, ObjectStorage};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::hls::FfmpegService;
use crate::metadata::{extract_track_metadata, EmbeddedCover};

#[derive(Clone)]
pub struct TranscodeConfig {
    pub hls_bucket: String,
    pub covers_bucket: String,
}

pub struct TranscodeWorker {
    storage: Arc<dyn ObjectStorage>,
    ffmpeg: FfmpegService,
    publisher: EventPublisher,
    config: TranscodeConfig,
}

impl TranscodeWorker {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        ffmpeg: FfmpegService,
        publisher: EventPublisher,
        config: TranscodeConfig,
    ) -> Self {
        Self {
            storage,
            ffmpeg,
            publisher,
            config,
        }
    }

    async fn process(&self, song_id: Uuid, bucket: &str, file_key: &str) -> anyhow::Result<()> {
        tracing::info!(song_id = %song_id, bucket = %bucket, file_key = %file_key, "Transcode started");

        // Scratch area namespaced by song id; the TempDir guard removes it
        // on every exit path, success or failure.
        let scratch = tempfile::Builder::new()
            .prefix(&format!("transcode-{}-", song_id))
            .tempdir()
            .context("Failed to create scratch directory")?;

        let ext = keys::file_extension(file_key);
        let input = scratch.path().join(format!("input_raw{}", ext));
        self.storage
            .download_to_file(bucket, file_key, &input)
            .await
            .context("Failed to download source object")?;

        let metadata = {
            let input = input.clone();
            tokio::task::spawn_blocking(move || extract_track_metadata(&input))
                .await
                .context("Metadata extraction task panicked")?
        };
        tracing::info!(
            song_id = %song_id,
            title = metadata.title.as_deref().unwrap_or(""),
            duration_seconds = metadata.duration_seconds,
            has_cover = metadata.cover.is_some(),
            "Metadata extracted"
        );

        let cover_key = match metadata.cover {
            Some(cover) => self.upload_cover(song_id, scratch.path(), cover).await,
            None => {
                tracing::warn!(song_id = %song_id, "No embedded cover art found");
                None
            }
        };

        let output_dir = scratch.path().join("hls_output");
        self.ffmpeg
            .convert_to_hls(&input, &output_dir)
            .await
            .context("Transcoding failed")?;

        self.storage
            .ensure_bucket(&self.config.hls_bucket)
            .await
            .context("Failed to ensure HLS bucket")?;
        let hls_key = self
            .storage
            .upload_dir(&output_dir, &self.config.hls_bucket, &format!("hls/{}", song_id))
            .await
            .context("Failed to upload HLS output")?;

        self.publisher
            .publish(EventPayload::MediaProcessed {
                song_id,
                hls_key: hls_key.clone(),
                duration_seconds: metadata.duration_seconds,
                title: metadata.title,
                artist: metadata.artist,
                album: metadata.album,
                cover_key,
            })
            .await
            .context("Failed to publish processed event")?;

        tracing::info!(song_id = %song_id, hls_key = %hls_key, "Transcode completed");
        Ok(())
    }

    /// Upload the embedded cover as `covers/{song_id}{ext}`. A failed
    /// cover upload degrades to "no cover" rather than failing the song.
    async fn upload_cover(
        &self,
        song_id: Uuid,
        scratch: &Path,
        cover: EmbeddedCover,
    ) -> Option<String> {
        let local = scratch.join(format!("cover{}", cover.extension));
        if let Err(e) = tokio::fs::write(&local, &cover.data).await {
            tracing::warn!(error = %e, song_id = %song_id, "Failed to write cover to scratch");
            return None;
        }

        let key = format!("covers/{}{}", song_id, cover.extension);
        let content_type = match cover.extension {
            ".png" => "image/png",
            ".gif" => "image/gif",
            _ => "image/jpeg",
        };

        if let Err(e) = self.storage.ensure_bucket(&self.config.covers_bucket).await {
            tracing::warn!(error = %e, song_id = %song_id, "Failed to ensure covers bucket");
            return None;
        }
        match self
            .storage
            .upload_file(&self.config.covers_bucket, &key, &local, content_type)
            .await
        {
            Ok(()) => {
                tracing::info!(song_id = %song_id, cover_key = %key, "Cover uploaded");
                Some(key)
            }
            Err(e) => {
                tracing::warn!(error = %e, song_id = %song_id, "Failed to upload cover");
                None
            }
        }
    }
}

#[async_trait]
impl EventHandler for TranscodeWorker {
    fn name(&self) -> &'static str {
        "transcode-worker"
    }

    fn subscriptions(&self) -> &'static [EventKind] {
        &[EventKind::MediaUploaded]
    }

    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), HandlerError> {
        let EventPayload::MediaUploaded {
            song_id,
            bucket,
            file_key,
        } = &envelope.payload
        else {
            return Err(HandlerError::permanent(anyhow::anyhow!(
                "unexpected payload for transcode worker: {}",
                envelope.kind()
            )));
        };

        self.process(*song_id, bucket, file_key)
            .await
            .map_err(HandlerError::transient)
    }
}
