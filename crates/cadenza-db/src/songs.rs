//! Repository for catalog songs.

use cadenza_core::models::Song;
use cadenza_core::AppError;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

#[derive(Clone)]
pub struct SongRepository {
    pool: PgPool,
}

impl SongRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, song: &Song) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO songs (
                id, title, artist, album, cover_key, hls_key,
                duration_seconds, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(song.id)
        .bind(&song.title)
        .bind(&song.artist)
        .bind(&song.album)
        .bind(&song.cover_key)
        .bind(&song.hls_key)
        .bind(song.duration_seconds)
        .bind(song.status.as_str())
        .bind(song.created_at)
        .bind(song.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Song>, AppError> {
        let row = sqlx::query_as::<_, Song>(
            r#"
            SELECT id, title, artist, album, cover_key, hls_key,
                   duration_seconds, status, created_at, updated_at
            FROM songs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn list(&self) -> Result<Vec<Song>, AppError> {
        let rows = sqlx::query_as::<_, Song>(
            r#"
            SELECT id, title, artist, album, cover_key, hls_key,
                   duration_seconds, status, created_at, updated_at
            FROM songs
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Apply a processed event: hls key and duration are authoritative,
    /// status becomes `ready`, and metadata follows
    /// extracted-value-wins-if-present (NULL or empty retains the current
    /// value). Returns whether a row was updated; `false` means the song
    /// no longer exists. Re-applying the same event sets the same values.
    pub async fn apply_processed(
        &self,
        id: Uuid,
        hls_key: &str,
        duration_seconds: f64,
        title: Option<&str>,
        artist: Option<&str>,
        album: Option<&str>,
        cover_key: Option<&str>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE songs
            SET hls_key = $2,
                duration_seconds = $3,
                status = 'ready',
                title = COALESCE(NULLIF($4, ''), title),
                artist = COALESCE(NULLIF($5, ''), artist),
                album = COALESCE(NULLIF($6, ''), album),
                cover_key = COALESCE(NULLIF($7, ''), cover_key),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(hls_key)
        .bind(duration_seconds)
        .bind(title)
        .bind(artist)
        .bind(album)
        .bind(cover_key)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Best-effort Draft → Processing. The guard keeps an out-of-order
    /// processed event from being downgraded.
    pub async fn mark_processing(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE songs
            SET status = 'processing', updated_at = NOW()
            WHERE id = $1 AND status = 'draft'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete within the caller's transaction so the song-deleted event
    /// can be enqueued atomically with the row removal.
    pub async fn delete_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM songs WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
