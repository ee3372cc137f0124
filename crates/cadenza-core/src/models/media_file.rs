//! Media file entity: one row per physical upload attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upload lifecycle. Transitions are monotonic: once a file leaves
/// `Pending`, a second attempt to leave `Pending` is a successful no-op,
/// never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaStatus {
    Pending,
    Uploaded,
    Processing,
    Ready,
    Failed,
}

impl MediaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaStatus::Pending => "pending",
            MediaStatus::Uploaded => "uploaded",
            MediaStatus::Processing => "processing",
            MediaStatus::Ready => "ready",
            MediaStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(MediaStatus::Pending),
            "uploaded" => Some(MediaStatus::Uploaded),
            "processing" => Some(MediaStatus::Processing),
            "ready" => Some(MediaStatus::Ready),
            "failed" => Some(MediaStatus::Failed),
            _ => None,
        }
    }

    /// Central transition table. `Ready` and `Failed` are terminal;
    /// `Processing` may be skipped when events arrive out of order.
    pub fn can_transition(self, to: MediaStatus) -> bool {
        use MediaStatus::*;
        matches!(
            (self, to),
            (Pending, Uploaded)
                | (Uploaded, Processing)
                | (Uploaded, Ready)
                | (Uploaded, Failed)
                | (Processing, Ready)
                | (Processing, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, MediaStatus::Ready | MediaStatus::Failed)
    }
}

impl std::fmt::Display for MediaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaFile {
    pub id: Uuid,
    pub song_id: Uuid,
    pub file_name: String,
    pub content_type: String,
    /// Byte size; 0 until the upload is confirmed and the backend can
    /// report the object length.
    pub file_size: i64,
    pub bucket: String,
    pub storage_key: String,
    pub status: MediaStatus,
    pub created_at: DateTime<Utc>,
}

impl MediaFile {
    /// Build a new pending upload record. The storage key is computed by
    /// the caller (category + date namespace + this id, see
    /// `cadenza_storage::keys`).
    pub fn new(
        id: Uuid,
        song_id: Uuid,
        file_name: String,
        content_type: String,
        bucket: String,
        storage_key: String,
    ) -> Self {
        Self {
            id,
            song_id,
            file_name,
            content_type,
            file_size: 0,
            bucket,
            storage_key,
            status: MediaStatus::Pending,
            created_at: Utc::now(),
        }
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for MediaFile {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;

        let status: String = row.try_get("status")?;
        let status = MediaStatus::parse(&status).ok_or_else(|| sqlx::Error::ColumnDecode {
            index: "status".to_string(),
            source: format!("unknown media status: {}", status).into(),
        })?;

        Ok(MediaFile {
            id: row.try_get("id")?,
            song_id: row.try_get("song_id")?,
            file_name: row.try_get("file_name")?,
            content_type: row.try_get("content_type")?,
            file_size: row.try_get("file_size")?,
            bucket: row.try_get("bucket")?,
            storage_key: row.try_get("storage_key")?,
            status,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_can_only_become_uploaded() {
        assert!(MediaStatus::Pending.can_transition(MediaStatus::Uploaded));
        assert!(!MediaStatus::Pending.can_transition(MediaStatus::Ready));
        assert!(!MediaStatus::Pending.can_transition(MediaStatus::Processing));
    }

    #[test]
    fn processing_may_be_skipped() {
        assert!(MediaStatus::Uploaded.can_transition(MediaStatus::Ready));
        assert!(MediaStatus::Uploaded.can_transition(MediaStatus::Processing));
        assert!(MediaStatus::Processing.can_transition(MediaStatus::Ready));
    }

    #[test]
    fn terminal_states_admit_nothing() {
        for terminal in [MediaStatus::Ready, MediaStatus::Failed] {
            assert!(terminal.is_terminal());
            for to in [
                MediaStatus::Pending,
                MediaStatus::Uploaded,
                MediaStatus::Processing,
                MediaStatus::Ready,
                MediaStatus::Failed,
            ] {
                assert!(!terminal.can_transition(to));
            }
        }
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            MediaStatus::Pending,
            MediaStatus::Uploaded,
            MediaStatus::Processing,
            MediaStatus::Ready,
            MediaStatus::Failed,
        ] {
            assert_eq!(MediaStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(MediaStatus::parse("bogus"), None);
    }
}
