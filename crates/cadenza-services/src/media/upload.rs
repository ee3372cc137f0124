//! Upload orchestrator: intake of raw files through hand-off to transcoding.

use cadenza_core::events::EventPayload;
use cadenza_core::models::{MediaFile, MediaStatus};
use cadenza_core::AppError;
use cadenza_db::MediaFileRepository;
use cadenza_relay::EventPublisher;
use cadenza_storage::{keys, ObjectStorage, UploadCategory};
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Clone)]
pub struct UploadConfig {
    pub raw_bucket: String,
    pub covers_bucket: String,
    pub avatars_bucket: String,
    /// Lifetime of a direct-upload grant.
    pub upload_url_expiry: Duration,
}

/// Parameters for a new upload grant.
#[derive(Debug, Clone)]
pub struct InitUpload {
    pub song_id: Option<Uuid>,
    pub file_name: String,
    pub content_type: String,
    pub category: Option<String>,
}

#[derive(Debug, Clone)]
pub struct InitUploadResult {
    pub upload_id: Uuid,
    pub upload_url: String,
    pub storage_key: String,
}

pub struct UploadService {
    pool: PgPool,
    media_files: MediaFileRepository,
    publisher: EventPublisher,
    storage: Arc<dyn ObjectStorage>,
    config: UploadConfig,
}

impl UploadService {
    pub fn new(
        pool: PgPool,
        media_files: MediaFileRepository,
        publisher: EventPublisher,
        storage: Arc<dyn ObjectStorage>,
        config: UploadConfig,
    ) -> Self {
        Self {
            pool,
            media_files,
            publisher,
            storage,
            config,
        }
    }

    fn bucket_for(&self, category: UploadCategory) -> &str {
        match category {
            UploadCategory::Audio => &self.config.raw_bucket,
            UploadCategory::Covers => &self.config.covers_bucket,
            UploadCategory::Avatars => &self.config.avatars_bucket,
        }
    }

    /// Create a Pending media file and hand out a time-bounded direct
    /// upload grant scoped to the declared content type.
    #[tracing::instrument(skip(self, request), fields(file_name = %request.file_name))]
    pub async fn init_upload(&self, request: InitUpload) -> Result<InitUploadResult, AppError> {
        if request.file_name.is_empty() {
            return Err(AppError::InvalidInput("file_name must not be empty".to_string()));
        }
        if request.content_type.is_empty() {
            return Err(AppError::InvalidInput(
                "content_type must not be empty".to_string(),
            ));
        }

        let file_id = Uuid::new_v4();
        // Uploads without an owning song (e.g. avatars) are keyed to the
        // upload itself.
        let song_id = request.song_id.unwrap_or(file_id);
        let category = UploadCategory::parse(request.category.as_deref());
        let bucket = self.bucket_for(category).to_string();
        let storage_key = keys::storage_key(category, song_id, file_id, &request.file_name, Utc::now());

        let media_file = MediaFile::new(
            file_id,
            song_id,
            request.file_name,
            request.content_type.clone(),
            bucket.clone(),
            storage_key.clone(),
        );
        self.media_files.create(&media_file).await?;

        self.storage.ensure_bucket(&bucket).await.map_err(|e| {
            tracing::error!(error = %e, bucket = %bucket, "Failed to ensure upload bucket");
            AppError::Storage(e.to_string())
        })?;

        let upload_url = self
            .storage
            .presigned_put_url(
                &bucket,
                &storage_key,
                &request.content_type,
                self.config.upload_url_expiry,
            )
            .await?;

        tracing::info!(
            upload_id = %file_id,
            song_id = %song_id,
            bucket = %bucket,
            storage_key = %storage_key,
            "Upload grant issued"
        );

        Ok(InitUploadResult {
            upload_id: file_id,
            upload_url,
            storage_key,
        })
    }

    /// Confirm a completed transfer: Pending → Uploaded and the
    /// MediaUploaded event, committed atomically via the outbox.
    ///
    /// A confirm for a file that already left Pending returns success
    /// without enqueuing a second event.
    #[tracing::instrument(skip(self), fields(upload_id = %upload_id))]
    pub async fn confirm_upload(&self, upload_id: Uuid) -> Result<(), AppError> {
        let media_file = self
            .media_files
            .get(upload_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Upload {} not found", upload_id)))?;

        // Monotonic transition rule: a file that already left Pending
        // treats a second confirmation as success, never as an error.
        if !media_file.status.can_transition(MediaStatus::Uploaded) {
            tracing::info!(status = %media_file.status, "Upload already confirmed, nothing to do");
            return Ok(());
        }

        // Size is known only after the transfer; best-effort lookup.
        let file_size = match self
            .storage
            .content_length(&media_file.bucket, &media_file.storage_key)
            .await
        {
            Ok(Some(len)) => len as i64,
            Ok(None) => 0,
            Err(e) => {
                tracing::warn!(error = %e, "Could not determine uploaded object size");
                0
            }
        };

        let mut tx = self.pool.begin().await?;
        // The SQL guard closes the race with a concurrent confirm: only
        // one caller observes the Pending → Uploaded transition.
        let transitioned = self
            .media_files
            .mark_uploaded_tx(&mut tx, upload_id, file_size)
            .await?;

        if transitioned {
            self.publisher
                .publish_tx(
                    &mut tx,
                    EventPayload::MediaUploaded {
                        song_id: media_file.song_id,
                        bucket: media_file.bucket.clone(),
                        file_key: media_file.storage_key.clone(),
                    },
                )
                .await?;
        }
        tx.commit().await?;

        if transitioned {
            self.publisher.notify().await;
            tracing::info!(song_id = %media_file.song_id, "Upload confirmed, event enqueued");
        }

        Ok(())
    }
}
