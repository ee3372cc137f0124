//! Search projector: keeps the denormalized song collection current.

use async_trait::async_trait;
use cadenza_core::events::{EventEnvelope, EventKind, EventPayload};
use cadenza_core::models::SongDocument;
use cadenza_core::HandlerError;
use cadenza_relay::EventHandler;
use std::sync::Arc;

use super::client::SearchIndex;

pub struct SearchProjector {
    index: Arc<dyn SearchIndex>,
}

impl SearchProjector {
    pub fn new(index: Arc<dyn SearchIndex>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl EventHandler for SearchProjector {
    fn name(&self) -> &'static str {
        "search-projector"
    }

    fn subscriptions(&self) -> &'static [EventKind] {
        &[EventKind::MediaProcessed, EventKind::SongDeleted]
    }

    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), HandlerError> {
        match &envelope.payload {
            EventPayload::MediaProcessed {
                song_id,
                hls_key,
                title,
                artist,
                album,
                cover_key,
                ..
            } => {
                let document = SongDocument {
                    id: song_id.to_string(),
                    title: title.clone().unwrap_or_else(|| "Unknown".to_string()),
                    artist: artist.clone().unwrap_or_else(|| "Unknown".to_string()),
                    album: album.clone().unwrap_or_else(|| "Unknown".to_string()),
                    cover_url: cover_key.clone().unwrap_or_default(),
                    url: hls_key.clone(),
                };
                // Upsert: redelivery replaces the document with the same
                // content.
                self.index.upsert_song(&document).await?;
                tracing::info!(song_id = %song_id, "Song indexed");
                Ok(())
            }
            EventPayload::SongDeleted { song_id } => {
                self.index.delete_song(&song_id.to_string()).await?;
                tracing::info!(song_id = %song_id, "Song removed from index");
                Ok(())
            }
            other => Err(HandlerError::permanent(anyhow::anyhow!(
                "unexpected payload for search projector: {}",
                other.kind()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemorySearchIndex;
    use uuid::Uuid;

    fn processed_event(song_id: Uuid, title: Option<&str>) -> EventEnvelope {
        EventEnvelope::new(EventPayload::MediaProcessed {
            song_id,
            hls_key: format!("hls/{}/index.m3u8", song_id),
            duration_seconds: 200.0,
            title: title.map(String::from),
            artist: Some("Artist".to_string()),
            album: None,
            cover_key: None,
        })
    }

    #[tokio::test]
    async fn redelivered_processed_event_upserts_identically() {
        let index = Arc::new(InMemorySearchIndex::default());
        let projector = SearchProjector::new(index.clone());
        let song_id = Uuid::new_v4();

        let event = processed_event(song_id, Some("Song"));
        projector.handle(&event).await.unwrap();
        projector.handle(&event).await.unwrap();

        let docs = index.documents();
        assert_eq!(docs.len(), 1);
        let doc = &docs[&song_id.to_string()];
        assert_eq!(doc.title, "Song");
        assert_eq!(doc.album, "Unknown");
        assert_eq!(doc.url, format!("hls/{}/index.m3u8", song_id));
    }

    #[tokio::test]
    async fn deleting_absent_document_is_not_an_error() {
        let index = Arc::new(InMemorySearchIndex::default());
        let projector = SearchProjector::new(index.clone());

        let event = EventEnvelope::new(EventPayload::SongDeleted {
            song_id: Uuid::new_v4(),
        });
        projector.handle(&event).await.unwrap();
        // Redelivery after cleanup: still no error.
        projector.handle(&event).await.unwrap();
        assert!(index.documents().is_empty());
    }

    #[tokio::test]
    async fn delete_after_index_removes_document() {
        let index = Arc::new(InMemorySearchIndex::default());
        let projector = SearchProjector::new(index.clone());
        let song_id = Uuid::new_v4();

        projector.handle(&processed_event(song_id, None)).await.unwrap();
        assert_eq!(index.documents().len(), 1);
        // Missing title falls back to the Unknown placeholder.
        assert_eq!(index.documents()[&song_id.to_string()].title, "Unknown");

        let delete = EventEnvelope::new(EventPayload::SongDeleted { song_id });
        projector.handle(&delete).await.unwrap();
        assert!(index.documents().is_empty());
    }
}
