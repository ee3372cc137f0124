//! FfmpegService - audio-to-HLS conversion via the ffmpeg subprocess.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("Failed to run ffmpeg at '{path}': {source}")]
    Spawn {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("ffmpeg exited with status {code}: {stderr}")]
    Failed { code: i32, stderr: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Invokes ffmpeg with a fixed argument set: single audio stream re-encoded
/// to AAC at the configured bitrate, 44.1 kHz stereo, segmented into a VOD
/// HLS stream with independently decodable ~10 s segments.
pub struct FfmpegService {
    ffmpeg_path: String,
    bitrate: String,
    segment_seconds: u32,
}

impl FfmpegService {
    pub fn new(ffmpeg_path: String, bitrate: String, segment_seconds: u32) -> Self {
        Self {
            ffmpeg_path,
            bitrate,
            segment_seconds,
        }
    }

    fn hls_args(&self, input: &Path, output_dir: &Path) -> Vec<String> {
        let index_path = output_dir.join("index.m3u8");
        let segment_pattern = output_dir.join("seg_%03d.ts");

        vec![
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-y".to_string(),
            // Audio encode: built-in AAC, twoloop coder, LC profile for
            // maximum player compatibility.
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            self.bitrate.clone(),
            "-ar".to_string(),
            "44100".to_string(),
            "-ac".to_string(),
            "2".to_string(),
            "-aac_coder".to_string(),
            "twoloop".to_string(),
            "-profile:a".to_string(),
            "aac_low".to_string(),
            // Audio stream only.
            "-map".to_string(),
            "0:a".to_string(),
            // HLS: VOD (full segment list), independent segments for fast
            // seeking.
            "-f".to_string(),
            "hls".to_string(),
            "-hls_time".to_string(),
            self.segment_seconds.to_string(),
            "-hls_list_size".to_string(),
            "0".to_string(),
            "-hls_segment_type".to_string(),
            "mpegts".to_string(),
            "-hls_flags".to_string(),
            "independent_segments".to_string(),
            "-hls_segment_filename".to_string(),
            segment_pattern.to_string_lossy().to_string(),
            index_path.to_string_lossy().to_string(),
        ]
    }

    /// Convert `input` into an HLS segment set under `output_dir`.
    /// Returns the path of the index playlist. A non-zero exit status is a
    /// hard failure for this attempt.
    pub async fn convert_to_hls(
        &self,
        input: &Path,
        output_dir: &Path,
    ) -> Result<PathBuf, TranscodeError> {
        tokio::fs::create_dir_all(output_dir).await?;

        let args = self.hls_args(input, output_dir);
        tracing::debug!(
            ffmpeg = %self.ffmpeg_path,
            args = %args.join(" "),
            "Running ffmpeg"
        );

        let output = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| TranscodeError::Spawn {
                path: self.ffmpeg_path.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // Keep the error bounded; ffmpeg can be very chatty.
            let tail: String = stderr
                .lines()
                .rev()
                .take(20)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n");
            return Err(TranscodeError::Failed {
                code: output.status.code().unwrap_or(-1),
                stderr: tail,
            });
        }

        Ok(output_dir.join("index.m3u8"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argument_set_is_vod_audio_hls() {
        let service = FfmpegService::new("ffmpeg".to_string(), "192k".to_string(), 10);
        let args = service.hls_args(Path::new("/tmp/in.flac"), Path::new("/tmp/out"));

        let expect_pair = |flag: &str, value: &str| {
            let idx = args
                .iter()
                .position(|a| a.as_str() == flag)
                .unwrap_or_else(|| panic!("missing flag {}", flag));
            assert_eq!(args[idx + 1], value, "wrong value for {}", flag);
        };

        expect_pair("-c:a", "aac");
        expect_pair("-b:a", "192k");
        expect_pair("-ar", "44100");
        expect_pair("-ac", "2");
        expect_pair("-aac_coder", "twoloop");
        expect_pair("-profile:a", "aac_low");
        expect_pair("-map", "0:a");
        expect_pair("-f", "hls");
        expect_pair("-hls_time", "10");
        // VOD: the playlist keeps every segment, not a rolling window.
        expect_pair("-hls_list_size", "0");
        expect_pair("-hls_flags", "independent_segments");
        assert_eq!(args.last().unwrap().as_str(), "/tmp/out/index.m3u8");
    }
}
