//! Configuration, loaded from the environment (with `.env` support).

use std::env;

use crate::AppError;

/// Storage backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackendKind {
    S3,
    Local,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub db_max_connections: u32,

    // Object storage
    pub storage_backend: StorageBackendKind,
    pub s3_endpoint: Option<String>,
    pub s3_region: String,
    pub s3_force_path_style: bool,
    pub local_storage_path: String,
    pub local_storage_base_url: String,
    pub raw_bucket: String,
    pub hls_bucket: String,
    pub covers_bucket: String,
    pub avatars_bucket: String,
    /// Presigned upload URL lifetime in seconds.
    pub upload_url_expiry_secs: u64,

    // Transcoding
    pub ffmpeg_path: String,
    pub hls_bitrate: String,
    pub hls_segment_seconds: u32,

    // Search
    pub typesense_url: String,
    pub typesense_api_key: String,
    pub search_collection: String,

    // Message relay
    pub relay_max_workers: usize,
    pub relay_poll_interval_ms: u64,
    pub relay_max_attempts: i32,
    pub relay_reap_interval_secs: u64,
    pub relay_delivering_grace_secs: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| AppError::Internal("DATABASE_URL is not set".to_string()))?;

        Ok(Self {
            server_port: parse_env("SERVER_PORT", 8080)?,
            database_url,
            db_max_connections: parse_env("DB_MAX_CONNECTIONS", 20)?,

            storage_backend: match env::var("STORAGE_BACKEND").as_deref() {
                Ok("local") => StorageBackendKind::Local,
                _ => StorageBackendKind::S3,
            },
            s3_endpoint: env::var("S3_ENDPOINT").ok(),
            s3_region: env_or("S3_REGION", "us-east-1"),
            s3_force_path_style: env::var("S3_FORCE_PATH_STYLE")
                .map(|v| v != "false")
                .unwrap_or(true),
            local_storage_path: env_or("LOCAL_STORAGE_PATH", "/var/lib/cadenza/storage"),
            local_storage_base_url: env_or("LOCAL_STORAGE_BASE_URL", "http://localhost:8080/files"),
            raw_bucket: env_or("RAW_BUCKET", "music-raw"),
            hls_bucket: env_or("HLS_BUCKET", "music-hls"),
            covers_bucket: env_or("COVERS_BUCKET", "music-covers"),
            avatars_bucket: env_or("AVATARS_BUCKET", "music-avatars"),
            upload_url_expiry_secs: parse_env("UPLOAD_URL_EXPIRY_SECS", 600)?,

            ffmpeg_path: env_or("FFMPEG_PATH", "ffmpeg"),
            hls_bitrate: env_or("HLS_BITRATE", "192k"),
            hls_segment_seconds: parse_env("HLS_SEGMENT_SECONDS", 10)?,

            typesense_url: env_or("TYPESENSE_URL", "http://localhost:8108"),
            typesense_api_key: env_or("TYPESENSE_API_KEY", ""),
            search_collection: env_or("SEARCH_COLLECTION", "songs"),

            relay_max_workers: parse_env("RELAY_MAX_WORKERS", 4)?,
            relay_poll_interval_ms: parse_env("RELAY_POLL_INTERVAL_MS", 1000)?,
            relay_max_attempts: parse_env("RELAY_MAX_ATTEMPTS", 5)?,
            relay_reap_interval_secs: parse_env("RELAY_REAP_INTERVAL_SECS", 60)?,
            relay_delivering_grace_secs: parse_env("RELAY_DELIVERING_GRACE_SECS", 300)?,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, AppError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| AppError::InvalidInput(format!("{} has an invalid value: {}", key, raw))),
        Err(_) => Ok(default),
    }
}
