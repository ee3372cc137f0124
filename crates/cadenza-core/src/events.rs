//! Integration events: the only contract between components.
//!
//! Every envelope carries a fresh event id and an occurrence timestamp in
//! addition to its payload. The payload enum is the wire format stored in
//! the outbox table; the `type` tag doubles as the subscription key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Immutable record of something that happened, as published to the outbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub payload: EventPayload,
}

impl EventEnvelope {
    /// Wrap a payload with a fresh event id and the current timestamp.
    /// A re-publish of the same logical fact gets a new envelope id.
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            payload,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventPayload {
    /// Raw upload confirmed; consumed by the transcoding worker (and, best
    /// effort, by the catalog projector to surface `Processing`).
    MediaUploaded {
        song_id: Uuid,
        bucket: String,
        file_key: String,
    },
    /// Transcode finished; consumed by the catalog projector and the
    /// search indexer. Metadata fields are present only when the worker
    /// extracted a non-empty value.
    MediaProcessed {
        song_id: Uuid,
        hls_key: String,
        duration_seconds: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        artist: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        album: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        cover_key: Option<String>,
    },
    /// Terminal processing failure for a song's upload.
    MediaProcessingFailed { song_id: Uuid, reason: String },
    /// Catalog row deleted; triggers media and search cleanup.
    SongDeleted { song_id: Uuid },
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::MediaUploaded { .. } => EventKind::MediaUploaded,
            EventPayload::MediaProcessed { .. } => EventKind::MediaProcessed,
            EventPayload::MediaProcessingFailed { .. } => EventKind::MediaProcessingFailed,
            EventPayload::SongDeleted { .. } => EventKind::SongDeleted,
        }
    }

    /// Song id every payload carries, used for logging and dead-letter
    /// handling.
    pub fn song_id(&self) -> Uuid {
        match self {
            EventPayload::MediaUploaded { song_id, .. }
            | EventPayload::MediaProcessed { song_id, .. }
            | EventPayload::MediaProcessingFailed { song_id, .. }
            | EventPayload::SongDeleted { song_id } => *song_id,
        }
    }
}

/// Subscription routing key; matches the serde `type` tag of the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    MediaUploaded,
    MediaProcessed,
    MediaProcessingFailed,
    SongDeleted,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::MediaUploaded => "MediaUploaded",
            EventKind::MediaProcessed => "MediaProcessed",
            EventKind::MediaProcessingFailed => "MediaProcessingFailed",
            EventKind::SongDeleted => "SongDeleted",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_type_tag_matches_kind() {
        let payload = EventPayload::SongDeleted {
            song_id: Uuid::new_v4(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "SongDeleted");
        assert_eq!(payload.kind().as_str(), "SongDeleted");
    }

    #[test]
    fn absent_metadata_fields_are_omitted() {
        let payload = EventPayload::MediaProcessed {
            song_id: Uuid::new_v4(),
            hls_key: "hls/x/index.m3u8".to_string(),
            duration_seconds: 12.5,
            title: None,
            artist: None,
            album: None,
            cover_key: None,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("title").is_none());
        assert!(json.get("cover_key").is_none());

        let back: EventPayload = serde_json::from_value(json).unwrap();
        match back {
            EventPayload::MediaProcessed { title, cover_key, .. } => {
                assert!(title.is_none());
                assert!(cover_key.is_none());
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn new_envelope_gets_fresh_id() {
        let payload = EventPayload::SongDeleted {
            song_id: Uuid::new_v4(),
        };
        let a = EventEnvelope::new(payload.clone());
        let b = EventEnvelope::new(payload);
        assert_ne!(a.id, b.id);
    }
}
