//! Catalog: song CRUD surface and the event projector that keeps song
//! playability in sync with worker outcomes.

use async_trait::async_trait;
use cadenza_core::events::{EventEnvelope, EventKind, EventPayload};
use cadenza_core::models::Song;
use cadenza_core::{AppError, HandlerError};
use cadenza_db::SongRepository;
use cadenza_relay::{EventHandler, EventPublisher};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct CreateSongRequest {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub cover_key: Option<String>,
}

pub struct CatalogService {
    pool: PgPool,
    songs: SongRepository,
    publisher: EventPublisher,
}

impl CatalogService {
    pub fn new(pool: PgPool, songs: SongRepository, publisher: EventPublisher) -> Self {
        Self {
            pool,
            songs,
            publisher,
        }
    }

    pub async fn create_song(&self, request: CreateSongRequest) -> Result<Song, AppError> {
        if request.title.is_empty() {
            return Err(AppError::InvalidInput("title must not be empty".to_string()));
        }

        let song = Song::new(
            Uuid::new_v4(),
            request.title,
            request.artist,
            request.album,
            request.cover_key,
        );
        self.songs.create(&song).await?;
        tracing::info!(song_id = %song.id, title = %song.title, "Song created");
        Ok(song)
    }

    pub async fn get_song(&self, id: Uuid) -> Result<Song, AppError> {
        self.songs
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Song {} not found", id)))
    }

    pub async fn list_songs(&self) -> Result<Vec<Song>, AppError> {
        self.songs.list().await
    }

    /// Remove the song and enqueue the song-deleted event in one
    /// transaction; cleanup across storage and the search index runs
    /// asynchronously off that event.
    pub async fn delete_song(&self, id: Uuid) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        let deleted = self.songs.delete_tx(&mut tx, id).await?;
        if !deleted {
            return Err(AppError::NotFound(format!("Song {} not found", id)));
        }
        self.publisher
            .publish_tx(&mut tx, EventPayload::SongDeleted { song_id: id })
            .await?;
        tx.commit().await?;
        self.publisher.notify().await;

        tracing::info!(song_id = %id, "Song deleted, cleanup event enqueued");
        Ok(())
    }
}

/// Applies worker outcomes to the song aggregate.
pub struct CatalogProjector {
    songs: SongRepository,
}

impl CatalogProjector {
    pub fn new(songs: SongRepository) -> Self {
        Self { songs }
    }
}

#[async_trait]
impl EventHandler for CatalogProjector {
    fn name(&self) -> &'static str {
        "catalog-projector"
    }

    fn subscriptions(&self) -> &'static [EventKind] {
        &[EventKind::MediaUploaded, EventKind::MediaProcessed]
    }

    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), HandlerError> {
        match &envelope.payload {
            EventPayload::MediaProcessed {
                song_id,
                hls_key,
                duration_seconds,
                title,
                artist,
                album,
                cover_key,
            } => {
                // Database errors bubble up as transient; an absent song is
                // permanent; retrying cannot make the aggregate reappear.
                let updated = self
                    .songs
                    .apply_processed(
                        *song_id,
                        hls_key,
                        *duration_seconds,
                        title.as_deref(),
                        artist.as_deref(),
                        album.as_deref(),
                        cover_key.as_deref(),
                    )
                    .await?;

                if updated {
                    tracing::info!(song_id = %song_id, hls_key = %hls_key, "Song is ready");
                } else {
                    tracing::warn!(
                        song_id = %song_id,
                        "Processed event for a song that no longer exists, dropping"
                    );
                }
                Ok(())
            }
            EventPayload::MediaUploaded { song_id, .. } => {
                // Informational phase; the draft-only guard keeps this from
                // ever downgrading a song that already went ready.
                if self.songs.mark_processing(*song_id).await? {
                    tracing::debug!(song_id = %song_id, "Song marked processing");
                }
                Ok(())
            }
            other => Err(HandlerError::permanent(anyhow::anyhow!(
                "unexpected payload for catalog projector: {}",
                other.kind()
            ))),
        }
    }
}
