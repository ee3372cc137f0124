//! Storage abstraction trait.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for cadenza_core::AppError {
    fn from(err: StorageError) -> Self {
        cadenza_core::AppError::Storage(err.to_string())
    }
}

/// Narrow interface over the object-storage collaborator.
///
/// Buckets are explicit because raw uploads, HLS output, and covers live
/// in separate namespaces. Deletions treat an absent target as success.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Create the bucket if missing and apply a public-read policy.
    /// Safe to call repeatedly.
    async fn ensure_bucket(&self, bucket: &str) -> StorageResult<()>;

    /// Generate a time-bounded PUT URL bound to the given content type.
    async fn presigned_put_url(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> StorageResult<String>;

    /// Download an object into a local file, creating parent directories.
    async fn download_to_file(&self, bucket: &str, key: &str, dest: &Path) -> StorageResult<()>;

    /// Upload a single local file.
    async fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
        content_type: &str,
    ) -> StorageResult<()>;

    /// Upload every file in a local directory under `key_prefix`.
    /// Returns the key of the segment index (`{key_prefix}/index.m3u8`).
    async fn upload_dir(
        &self,
        local_dir: &Path,
        bucket: &str,
        key_prefix: &str,
    ) -> StorageResult<String>;

    /// Delete a single object. Absence is success.
    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()>;

    /// Delete every object under a key prefix. An empty prefix listing is
    /// success.
    async fn delete_prefix(&self, bucket: &str, prefix: &str) -> StorageResult<()>;

    /// Byte size of an object, or `None` if it does not exist.
    async fn content_length(&self, bucket: &str, key: &str) -> StorageResult<Option<u64>>;
}

/// Content type for uploaded HLS artifacts, by file extension.
pub(crate) fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("m3u8") => "application/vnd.apple.mpegurl",
        Some("ts") => "video/mp2t",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}
