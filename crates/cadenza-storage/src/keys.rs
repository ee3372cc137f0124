//! Storage key generation.
//!
//! The upload category determines the key namespace:
//! `avatars/{owner}/...`, `covers/{yyyyMM}/...`, `audio/{yyyy/MM/dd}/...`.
//! The upload id is the random component, preventing both collisions and
//! key guessing.

use chrono::{DateTime, Utc};
use std::path::Path;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadCategory {
    Audio,
    Covers,
    Avatars,
}

impl UploadCategory {
    /// Unknown or absent categories fall back to the audio namespace.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("covers") => UploadCategory::Covers,
            Some("avatars") => UploadCategory::Avatars,
            _ => UploadCategory::Audio,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadCategory::Audio => "audio",
            UploadCategory::Covers => "covers",
            UploadCategory::Avatars => "avatars",
        }
    }
}

/// Compute the storage key for a new upload.
///
/// `owner` scopes avatar keys; `file_id` is the upload id and the random
/// component of every key. The original file extension is preserved.
pub fn storage_key(
    category: UploadCategory,
    owner: Uuid,
    file_id: Uuid,
    file_name: &str,
    now: DateTime<Utc>,
) -> String {
    let ext = file_extension(file_name);
    match category {
        UploadCategory::Audio => {
            format!("audio/{}/{}{}", now.format("%Y/%m/%d"), file_id, ext)
        }
        UploadCategory::Covers => {
            format!("covers/{}/{}{}", now.format("%Y%m"), file_id, ext)
        }
        UploadCategory::Avatars => format!("avatars/{}/{}{}", owner, file_id, ext),
    }
}

/// Extension including the leading dot, or empty when the name has none.
pub fn file_extension(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 7, 12, 0, 0).unwrap()
    }

    #[test]
    fn audio_keys_are_date_partitioned() {
        let id = Uuid::new_v4();
        let key = storage_key(UploadCategory::Audio, Uuid::nil(), id, "track.flac", fixed_now());
        assert_eq!(key, format!("audio/2026/03/07/{}.flac", id));
    }

    #[test]
    fn cover_keys_use_month_partition() {
        let id = Uuid::new_v4();
        let key = storage_key(UploadCategory::Covers, Uuid::nil(), id, "art.png", fixed_now());
        assert_eq!(key, format!("covers/202603/{}.png", id));
    }

    #[test]
    fn avatar_keys_are_owner_scoped() {
        let owner = Uuid::new_v4();
        let id = Uuid::new_v4();
        let key = storage_key(UploadCategory::Avatars, owner, id, "me.jpg", fixed_now());
        assert_eq!(key, format!("avatars/{}/{}.jpg", owner, id));
    }

    #[test]
    fn unknown_category_defaults_to_audio() {
        assert_eq!(UploadCategory::parse(None), UploadCategory::Audio);
        assert_eq!(UploadCategory::parse(Some("video")), UploadCategory::Audio);
        assert_eq!(UploadCategory::parse(Some("covers")), UploadCategory::Covers);
        assert_eq!(UploadCategory::parse(Some("avatars")), UploadCategory::Avatars);
    }

    #[test]
    fn extension_is_preserved_or_empty() {
        assert_eq!(file_extension("a.mp3"), ".mp3");
        assert_eq!(file_extension("noext"), "");
    }
}
