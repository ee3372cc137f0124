//! Transcoding worker: consumes upload events, converts audio to an HLS
//! VOD stream, extracts tag metadata, and publishes the processed event.

pub mod hls;
pub mod metadata;
pub mod transcode;

pub use hls::{FfmpegService, TranscodeError};
pub use metadata::{extract_track_metadata, EmbeddedCover, TrackMetadata};
pub use transcode::{TranscodeConfig, TranscodeWorker};
