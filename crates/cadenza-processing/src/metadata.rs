//! Tag metadata extraction (title, artist, album, duration, embedded cover).
//!
//! Extraction is tolerant: unreadable or tagless files yield defaults and
//! a warning rather than an error. Downstream consumers substitute their
//! own fallbacks for missing fields.

use lofty::file::TaggedFileExt;
use lofty::picture::MimeType;
use lofty::prelude::*;
use lofty::probe::Probe;
use std::path::Path;

/// Cover image pulled out of the file's tags.
#[derive(Debug, Clone)]
pub struct EmbeddedCover {
    pub data: Vec<u8>,
    /// Extension with leading dot, derived from the picture MIME type.
    pub extension: &'static str,
}

#[derive(Debug, Clone, Default)]
pub struct TrackMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub duration_seconds: f64,
    pub cover: Option<EmbeddedCover>,
}

/// Extension for a cover image MIME type; unknown types fall back to jpg.
pub(crate) fn cover_extension_for(mime: Option<&MimeType>) -> &'static str {
    match mime {
        Some(MimeType::Png) => ".png",
        Some(MimeType::Gif) => ".gif",
        _ => ".jpg",
    }
}

/// Extract tag metadata from an audio file. Blocking; call from
/// `spawn_blocking` in async contexts.
pub fn extract_track_metadata(path: &Path) -> TrackMetadata {
    match try_extract(path) {
        Ok(metadata) => metadata,
        Err(e) => {
            tracing::warn!(
                error = %e,
                file = %path.display(),
                "Failed to read tags, continuing with empty metadata"
            );
            TrackMetadata::default()
        }
    }
}

fn try_extract(path: &Path) -> Result<TrackMetadata, lofty::error::LoftyError> {
    let tagged_file = Probe::open(path)?.read()?;

    let duration_seconds = tagged_file.properties().duration().as_secs_f64();

    let tag = tagged_file.primary_tag().or_else(|| tagged_file.first_tag());
    let (title, artist, album, cover) = match tag {
        Some(tag) => {
            let cover = tag.pictures().first().map(|pic| EmbeddedCover {
                data: pic.data().to_vec(),
                extension: cover_extension_for(pic.mime_type()),
            });
            (
                tag.title().map(|s| s.to_string()),
                tag.artist().map(|s| s.to_string()),
                tag.album().map(|s| s.to_string()),
                cover,
            )
        }
        None => (None, None, None, None),
    };

    Ok(TrackMetadata {
        title,
        artist,
        album,
        duration_seconds,
        cover,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_mime_defaults_to_jpg() {
        assert_eq!(cover_extension_for(None), ".jpg");
        assert_eq!(cover_extension_for(Some(&MimeType::Jpeg)), ".jpg");
        assert_eq!(cover_extension_for(Some(&MimeType::Png)), ".png");
        assert_eq!(cover_extension_for(Some(&MimeType::Gif)), ".gif");
    }

    #[test]
    fn unreadable_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not_audio.mp3");
        std::fs::write(&path, b"this is not an audio file").unwrap();

        let metadata = extract_track_metadata(&path);
        assert!(metadata.title.is_none());
        assert!(metadata.artist.is_none());
        assert!(metadata.album.is_none());
        assert!(metadata.cover.is_none());
        assert_eq!(metadata.duration_seconds, 0.0);
    }
}
