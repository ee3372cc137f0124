//! Catalog song aggregate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `Draft` is the creation state; `Ready` is reached only via a processed
/// event. `Processing` is informational and set best-effort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SongStatus {
    Draft,
    Processing,
    Ready,
}

impl SongStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SongStatus::Draft => "draft",
            SongStatus::Processing => "processing",
            SongStatus::Ready => "ready",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(SongStatus::Draft),
            "processing" => Some(SongStatus::Processing),
            "ready" => Some(SongStatus::Ready),
            _ => None,
        }
    }
}

impl std::fmt::Display for SongStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Song {
    pub id: Uuid,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub cover_key: Option<String>,
    pub hls_key: Option<String>,
    pub duration_seconds: f64,
    pub status: SongStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Song {
    pub fn new(id: Uuid, title: String, artist: String, album: String, cover_key: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            title,
            artist,
            album,
            cover_key,
            hls_key: None,
            duration_seconds: 0.0,
            status: SongStatus::Draft,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a successful transcode outcome.
    ///
    /// HLS key and duration are authoritative. Metadata fields follow
    /// extracted-value-wins-if-present: a non-empty worker value
    /// overwrites, an absent/empty one retains the existing draft value.
    /// Re-applying the same event sets the same final values.
    pub fn apply_processed(
        &mut self,
        hls_key: &str,
        duration_seconds: f64,
        title: Option<&str>,
        artist: Option<&str>,
        album: Option<&str>,
        cover_key: Option<&str>,
    ) {
        self.hls_key = Some(hls_key.to_string());
        self.duration_seconds = duration_seconds;
        self.status = SongStatus::Ready;

        if let Some(title) = non_empty(title) {
            self.title = title.to_string();
        }
        if let Some(artist) = non_empty(artist) {
            self.artist = artist.to_string();
        }
        if let Some(album) = non_empty(album) {
            self.album = album.to_string();
        }
        if let Some(cover) = non_empty(cover_key) {
            self.cover_key = Some(cover.to_string());
        }
        self.updated_at = Utc::now();
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for Song {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;

        let status: String = row.try_get("status")?;
        let status = SongStatus::parse(&status).ok_or_else(|| sqlx::Error::ColumnDecode {
            index: "status".to_string(),
            source: format!("unknown song status: {}", status).into(),
        })?;

        Ok(Song {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            artist: row.try_get("artist")?,
            album: row.try_get("album")?,
            cover_key: row.try_get("cover_key")?,
            hls_key: row.try_get("hls_key")?,
            duration_seconds: row.try_get("duration_seconds")?,
            status,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}
