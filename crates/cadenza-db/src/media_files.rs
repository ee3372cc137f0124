//! Repository for media file rows.

use cadenza_core::models::MediaFile;
use cadenza_core::AppError;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

#[derive(Clone)]
pub struct MediaFileRepository {
    pool: PgPool,
}

impl MediaFileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, file: &MediaFile) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO media_files (
                id, song_id, file_name, content_type, file_size,
                bucket, storage_key, status, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(file.id)
        .bind(file.song_id)
        .bind(&file.file_name)
        .bind(&file.content_type)
        .bind(file.file_size)
        .bind(&file.bucket)
        .bind(&file.storage_key)
        .bind(file.status.as_str())
        .bind(file.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<MediaFile>, AppError> {
        let row = sqlx::query_as::<_, MediaFile>(
            r#"
            SELECT id, song_id, file_name, content_type, file_size,
                   bucket, storage_key, status, created_at
            FROM media_files
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn list_by_song(&self, song_id: Uuid) -> Result<Vec<MediaFile>, AppError> {
        let rows = sqlx::query_as::<_, MediaFile>(
            r#"
            SELECT id, song_id, file_name, content_type, file_size,
                   bucket, storage_key, status, created_at
            FROM media_files
            WHERE song_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(song_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Pending → Uploaded, recording the object size. Returns whether the
    /// transition happened; `false` means the file already left Pending
    /// and the caller must treat the request as a successful no-op.
    pub async fn mark_uploaded_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        file_size: i64,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE media_files
            SET status = 'uploaded', file_size = $2
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(file_size)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Best-effort Uploaded → Processing for every file of a song.
    pub async fn mark_processing_by_song(&self, song_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE media_files
            SET status = 'processing'
            WHERE song_id = $1 AND status = 'uploaded'
            "#,
        )
        .bind(song_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Terminal success for every non-terminal file of a song.
    pub async fn mark_ready_by_song(&self, song_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE media_files
            SET status = 'ready'
            WHERE song_id = $1 AND status IN ('uploaded', 'processing')
            "#,
        )
        .bind(song_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Terminal failure for every non-terminal file of a song.
    pub async fn mark_failed_by_song(&self, song_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE media_files
            SET status = 'failed'
            WHERE song_id = $1 AND status IN ('uploaded', 'processing')
            "#,
        )
        .bind(song_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn delete_by_song(&self, song_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM media_files WHERE song_id = $1")
            .bind(song_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
