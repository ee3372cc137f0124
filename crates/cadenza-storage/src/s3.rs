//! S3-compatible storage backend (AWS S3, MinIO).

use crate::traits::{content_type_for, ObjectStorage, StorageError, StorageResult};
use async_trait::async_trait;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use aws_sdk_s3::Client;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

#[derive(Clone)]
pub struct S3ObjectStorage {
    client: Client,
}

impl S3ObjectStorage {
    /// Build a client from the environment (credentials, etc.) plus the
    /// explicit endpoint settings. MinIO requires path-style addressing.
    pub async fn new(
        region: String,
        endpoint_url: Option<String>,
        force_path_style: bool,
    ) -> StorageResult<Self> {
        let base = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(region))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&base).force_path_style(force_path_style);
        if let Some(endpoint) = endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
        })
    }

    fn public_read_policy(bucket: &str) -> String {
        format!(
            r#"{{
    "Version": "2012-10-17",
    "Statement": [
        {{
            "Effect": "Allow",
            "Principal": "*",
            "Action": [ "s3:GetObject" ],
            "Resource": [ "arn:aws:s3:::{}/*" ]
        }}
    ]
}}"#,
            bucket
        )
    }
}

#[async_trait]
impl ObjectStorage for S3ObjectStorage {
    async fn ensure_bucket(&self, bucket: &str) -> StorageResult<()> {
        let exists = self
            .client
            .head_bucket()
            .bucket(bucket)
            .send()
            .await
            .is_ok();

        if !exists {
            tracing::info!(bucket = %bucket, "Bucket not found, creating it");
            if let Err(e) = self.client.create_bucket().bucket(bucket).send().await {
                let service_err = e.into_service_error();
                // A concurrent create is fine; anything else is not.
                if !service_err.is_bucket_already_owned_by_you()
                    && !service_err.is_bucket_already_exists()
                {
                    return Err(StorageError::BackendError(format!(
                        "Failed to create bucket {}: {}",
                        bucket, service_err
                    )));
                }
            }
        }

        // Streaming clients fetch segments directly, so the bucket must be
        // publicly readable. Policy application can fail on locked-down
        // providers; that is a warning, not a hard failure.
        if let Err(e) = self
            .client
            .put_bucket_policy()
            .bucket(bucket)
            .policy(Self::public_read_policy(bucket))
            .send()
            .await
        {
            tracing::warn!(error = %e, bucket = %bucket, "Failed to apply public-read policy");
        }

        Ok(())
    }

    async fn presigned_put_url(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> StorageResult<String> {
        let presigning = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        let presigned = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::BackendError(format!("Presigning failed: {}", e)))?;

        Ok(presigned.uri().to_string())
    }

    async fn download_to_file(&self, bucket: &str, key: &str, dest: &Path) -> StorageResult<()> {
        let resp = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let service_err = e.into_service_error();
                if service_err.is_no_such_key() {
                    StorageError::NotFound(format!("{}/{}", bucket, key))
                } else {
                    StorageError::DownloadFailed(format!("{}/{}: {}", bucket, key, service_err))
                }
            })?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(dest).await?;
        let mut body = resp.body.into_async_read();
        tokio::io::copy(&mut body, &mut file).await?;
        file.flush().await?;

        tracing::debug!(bucket = %bucket, key = %key, dest = %dest.display(), "Object downloaded");
        Ok(())
    }

    async fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
        content_type: &str,
    ) -> StorageResult<()> {
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| StorageError::UploadFailed(format!("{}: {}", local_path.display(), e)))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| StorageError::UploadFailed(format!("{}/{}: {}", bucket, key, e)))?;

        tracing::debug!(bucket = %bucket, key = %key, "Object uploaded");
        Ok(())
    }

    async fn upload_dir(
        &self,
        local_dir: &Path,
        bucket: &str,
        key_prefix: &str,
    ) -> StorageResult<String> {
        let mut entries = tokio::fs::read_dir(local_dir).await?;
        let mut uploaded = 0usize;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| StorageError::InvalidKey(format!("{}", path.display())))?
                .to_string();

            let key = format!("{}/{}", key_prefix, file_name);
            self.upload_file(bucket, &key, &path, content_type_for(&path))
                .await?;
            uploaded += 1;
        }

        tracing::info!(
            bucket = %bucket,
            key_prefix = %key_prefix,
            files = uploaded,
            "Directory uploaded"
        );
        Ok(format!("{}/index.m3u8", key_prefix))
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        // S3 delete is idempotent: deleting a missing key succeeds.
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::DeleteFailed(format!("{}/{}: {}", bucket, key, e)))?;

        tracing::debug!(bucket = %bucket, key = %key, "Object deleted");
        Ok(())
    }

    async fn delete_prefix(&self, bucket: &str, prefix: &str) -> StorageResult<()> {
        let mut continuation: Option<String> = None;
        let mut total = 0usize;

        loop {
            let listing = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| StorageError::BackendError(format!("List {}/{}: {}", bucket, prefix, e)))?;

            let keys: Vec<String> = listing
                .contents()
                .iter()
                .filter_map(|o| o.key().map(String::from))
                .collect();

            if !keys.is_empty() {
                let identifiers = keys
                    .iter()
                    .map(|k| {
                        ObjectIdentifier::builder()
                            .key(k)
                            .build()
                            .map_err(|e| StorageError::BackendError(e.to_string()))
                    })
                    .collect::<StorageResult<Vec<_>>>()?;

                let delete = Delete::builder()
                    .set_objects(Some(identifiers))
                    .build()
                    .map_err(|e| StorageError::BackendError(e.to_string()))?;

                self.client
                    .delete_objects()
                    .bucket(bucket)
                    .delete(delete)
                    .send()
                    .await
                    .map_err(|e| {
                        StorageError::DeleteFailed(format!("{}/{}: {}", bucket, prefix, e))
                    })?;
                total += keys.len();
            }

            if listing.is_truncated() == Some(true) {
                continuation = listing.next_continuation_token().map(String::from);
            } else {
                break;
            }
        }

        tracing::info!(bucket = %bucket, prefix = %prefix, objects = total, "Prefix deleted");
        Ok(())
    }

    async fn content_length(&self, bucket: &str, key: &str) -> StorageResult<Option<u64>> {
        match self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
        {
            Ok(head) => Ok(head.content_length().map(|len| len.max(0) as u64)),
            Err(e) => {
                let service_err = e.into_service_error();
                if service_err.is_not_found() {
                    Ok(None)
                } else {
                    Err(StorageError::BackendError(format!(
                        "Head {}/{}: {}",
                        bucket, key, service_err
                    )))
                }
            }
        }
    }
}
