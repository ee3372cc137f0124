//! Local filesystem storage backend, for development and tests.
//!
//! Buckets are directories under the base path. Presigned URLs are
//! synthetic (`{base_url}/{bucket}/{key}`); the dev server serves the tree
//! read-only, uploads land through the same process.

use crate::traits::{ObjectStorage, StorageError, StorageResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
    base_url: String,
}

impl LocalStorage {
    pub async fn new(base_path: impl Into<PathBuf>, base_url: String) -> StorageResult<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;
        Ok(Self {
            base_path,
            base_url,
        })
    }

    /// Resolve bucket/key to a path, rejecting traversal sequences that
    /// could escape the base directory.
    fn resolve(&self, bucket: &str, key: &str) -> StorageResult<PathBuf> {
        if key.contains("..") || key.starts_with('/') || bucket.contains("..") || bucket.contains('/')
        {
            return Err(StorageError::InvalidKey(format!("{}/{}", bucket, key)));
        }
        Ok(self.base_path.join(bucket).join(key))
    }
}

#[async_trait]
impl ObjectStorage for LocalStorage {
    async fn ensure_bucket(&self, bucket: &str) -> StorageResult<()> {
        let dir = self.resolve(bucket, "")?;
        fs::create_dir_all(&dir).await?;
        Ok(())
    }

    async fn presigned_put_url(
        &self,
        bucket: &str,
        key: &str,
        _content_type: &str,
        expires_in: Duration,
    ) -> StorageResult<String> {
        // No signature to compute locally; keep the expiry visible so
        // callers exercise the same URL shape as the S3 backend.
        Ok(format!(
            "{}/{}/{}?expires={}",
            self.base_url.trim_end_matches('/'),
            bucket,
            key,
            expires_in.as_secs()
        ))
    }

    async fn download_to_file(&self, bucket: &str, key: &str, dest: &Path) -> StorageResult<()> {
        let src = self.resolve(bucket, key)?;
        if !src.exists() {
            return Err(StorageError::NotFound(format!("{}/{}", bucket, key)));
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(&src, dest).await?;
        Ok(())
    }

    async fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
        _content_type: &str,
    ) -> StorageResult<()> {
        let dest = self.resolve(bucket, key)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(local_path, &dest).await?;
        Ok(())
    }

    async fn upload_dir(
        &self,
        local_dir: &Path,
        bucket: &str,
        key_prefix: &str,
    ) -> StorageResult<String> {
        let mut entries = fs::read_dir(local_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| StorageError::InvalidKey(format!("{}", path.display())))?;
            self.upload_file(bucket, &format!("{}/{}", key_prefix, file_name), &path, "")
                .await?;
        }
        Ok(format!("{}/index.m3u8", key_prefix))
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        let path = self.resolve(bucket, key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::DeleteFailed(format!(
                "{}/{}: {}",
                bucket, key, e
            ))),
        }
    }

    async fn delete_prefix(&self, bucket: &str, prefix: &str) -> StorageResult<()> {
        let path = self.resolve(bucket, prefix)?;
        match fs::remove_dir_all(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::DeleteFailed(format!(
                "{}/{}: {}",
                bucket, prefix, e
            ))),
        }
    }

    async fn content_length(&self, bucket: &str, key: &str) -> StorageResult<Option<u64>> {
        let path = self.resolve(bucket, key)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::BackendError(format!(
                "{}/{}: {}",
                bucket, key, e
            ))),
        }
    }
}
