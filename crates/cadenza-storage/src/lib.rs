//! Object storage abstraction and backends.
//!
//! All derived artifacts (raw uploads, HLS segment sets, cover images)
//! live behind the [`ObjectStorage`] trait. The S3 backend targets any
//! S3-compatible endpoint (MinIO in development); the local backend backs
//! dev setups and tests.

pub mod keys;
pub mod local;
pub mod s3;
pub mod traits;

pub use keys::UploadCategory;
pub use local::LocalStorage;
pub use s3::S3ObjectStorage;
pub use traits::{ObjectStorage, StorageError, StorageResult};
