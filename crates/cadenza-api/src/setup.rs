//! Application wiring: database, storage, search, services, relay, routes.

use anyhow::Context;
use async_trait::async_trait;
use axum::Router;
use cadenza_core::config::StorageBackendKind;
use cadenza_core::events::{EventEnvelope, EventPayload};
use cadenza_core::Config;
use cadenza_db::{MediaFileRepository, OutboxRepository, SongRepository};
use cadenza_processing::{FfmpegService, TranscodeConfig, TranscodeWorker};
use cadenza_relay::{
    DeadLetterHandler, EventPublisher, EventRelay, HandlerRegistry, RelayConfig,
};
use cadenza_services::{
    CatalogProjector, CatalogService, CleanupConfig, MediaCleanup, MediaStatusProjector,
    SearchIndex, SearchProjector, TypesenseSearchIndex, UploadConfig, UploadService,
};
use cadenza_storage::{LocalStorage, ObjectStorage, S3ObjectStorage};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

use crate::routes::build_router;
use crate::state::AppState;

/// Running application: HTTP router plus the background relay.
pub struct App {
    pub state: Arc<AppState>,
    pub router: Router,
    pub relay: EventRelay,
}

/// Core services built over injected collaborators; shared between the
/// production wiring and the integration tests.
pub struct ServiceSet {
    pub state: Arc<AppState>,
    pub publisher: EventPublisher,
    pub outbox: OutboxRepository,
    pub media_files: MediaFileRepository,
    pub songs: SongRepository,
}

pub fn build_services(
    pool: PgPool,
    storage: Arc<dyn ObjectStorage>,
    search: Arc<dyn SearchIndex>,
    config: &Config,
) -> ServiceSet {
    let outbox = OutboxRepository::new(pool.clone());
    let media_files = MediaFileRepository::new(pool.clone());
    let songs = SongRepository::new(pool.clone());
    let publisher = EventPublisher::new(outbox.clone());

    let upload = UploadService::new(
        pool.clone(),
        media_files.clone(),
        publisher.clone(),
        storage.clone(),
        UploadConfig {
            raw_bucket: config.raw_bucket.clone(),
            covers_bucket: config.covers_bucket.clone(),
            avatars_bucket: config.avatars_bucket.clone(),
            upload_url_expiry: Duration::from_secs(config.upload_url_expiry_secs),
        },
    );
    let catalog = CatalogService::new(pool.clone(), songs.clone(), publisher.clone());

    let state = Arc::new(AppState {
        pool,
        upload,
        catalog,
        search,
    });

    ServiceSet {
        state,
        publisher,
        outbox,
        media_files,
        songs,
    }
}

/// Subscribe every consumer: the transcoding worker, both projectors, the
/// search indexer, and the cleanup saga.
pub fn build_registry(
    services: &ServiceSet,
    storage: Arc<dyn ObjectStorage>,
    search: Arc<dyn SearchIndex>,
    config: &Config,
) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();

    registry.subscribe(Arc::new(TranscodeWorker::new(
        storage.clone(),
        FfmpegService::new(
            config.ffmpeg_path.clone(),
            config.hls_bitrate.clone(),
            config.hls_segment_seconds,
        ),
        services.publisher.clone(),
        TranscodeConfig {
            hls_bucket: config.hls_bucket.clone(),
            covers_bucket: config.covers_bucket.clone(),
        },
    )));
    registry.subscribe(Arc::new(CatalogProjector::new(services.songs.clone())));
    registry.subscribe(Arc::new(SearchProjector::new(search)));
    registry.subscribe(Arc::new(MediaStatusProjector::new(
        services.media_files.clone(),
    )));
    registry.subscribe(Arc::new(MediaCleanup::new(
        services.media_files.clone(),
        storage,
        CleanupConfig {
            hls_bucket: config.hls_bucket.clone(),
            covers_bucket: config.covers_bucket.clone(),
        },
    )));

    registry
}

/// Dead-letter hook: a media-uploaded delivery that exhausts its attempts
/// becomes a visible processing failure.
pub struct ProcessingFailurePublisher {
    publisher: EventPublisher,
}

impl ProcessingFailurePublisher {
    pub fn new(publisher: EventPublisher) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl DeadLetterHandler for ProcessingFailurePublisher {
    async fn on_dead(&self, envelope: &EventEnvelope, error: &str) {
        let EventPayload::MediaUploaded { song_id, .. } = &envelope.payload else {
            return;
        };
        match self
            .publisher
            .publish(EventPayload::MediaProcessingFailed {
                song_id: *song_id,
                reason: error.to_string(),
            })
            .await
        {
            Ok(_) => {
                tracing::error!(song_id = %song_id, reason = %error, "Published processing failure")
            }
            Err(e) => {
                tracing::error!(error = %e, song_id = %song_id, "Failed to publish processing failure")
            }
        }
    }
}

pub async fn initialize(config: Config) -> anyhow::Result<App> {
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    let storage: Arc<dyn ObjectStorage> = match config.storage_backend {
        StorageBackendKind::S3 => Arc::new(
            S3ObjectStorage::new(
                config.s3_region.clone(),
                config.s3_endpoint.clone(),
                config.s3_force_path_style,
            )
            .await?,
        ),
        StorageBackendKind::Local => Arc::new(
            LocalStorage::new(
                config.local_storage_path.clone(),
                config.local_storage_base_url.clone(),
            )
            .await?,
        ),
    };

    let search: Arc<dyn SearchIndex> = Arc::new(TypesenseSearchIndex::new(
        config.typesense_url.clone(),
        config.typesense_api_key.clone(),
        config.search_collection.clone(),
    ));
    // Search being down must not block ingestion; the indexer will fail
    // transiently and redeliver once the collection exists.
    if let Err(e) = search.ensure_collection().await {
        tracing::warn!(error = %e, "Search collection setup failed, continuing");
    }

    let services = build_services(pool.clone(), storage.clone(), search.clone(), &config);
    let registry = Arc::new(build_registry(
        &services,
        storage.clone(),
        search.clone(),
        &config,
    ));

    let relay = EventRelay::start(
        services.outbox.clone(),
        registry,
        RelayConfig {
            max_workers: config.relay_max_workers,
            poll_interval_ms: config.relay_poll_interval_ms,
            max_attempts: config.relay_max_attempts,
            reap_interval_secs: config.relay_reap_interval_secs,
            delivering_grace_secs: config.relay_delivering_grace_secs,
        },
        Some(pool),
        Some(Arc::new(ProcessingFailurePublisher::new(
            services.publisher.clone(),
        ))),
    );

    let router = build_router(services.state.clone());

    Ok(App {
        state: services.state,
        router,
        relay,
    })
}
