//! Test helpers: build the router and services over a real PostgreSQL
//! database with local-disk storage and an in-memory search index.
//!
//! Tests are gated on `DATABASE_URL`; without it they skip. The outbox
//! table is shared, so tests serialize on [`test_lock`] and scrub
//! leftover pending events at startup.

use axum_test::TestServer;
use cadenza_api::routes::build_router;
use cadenza_api::setup::{build_services, ServiceSet};
use cadenza_core::Config;
use cadenza_relay::{process_next, HandlerRegistry};
use cadenza_services::testing::InMemorySearchIndex;
use cadenza_services::{
    CatalogProjector, CleanupConfig, MediaCleanup, MediaStatusProjector, SearchProjector,
};
use cadenza_storage::{LocalStorage, ObjectStorage};
use sqlx::postgres::PgPoolOptions;
use sqlx::Row;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

static TEST_LOCK: Mutex<()> = Mutex::const_new(());

pub async fn test_lock() -> MutexGuard<'static, ()> {
    TEST_LOCK.lock().await
}

pub struct TestApp {
    pub server: TestServer,
    pub services: ServiceSet,
    pub registry: Arc<HandlerRegistry>,
    pub search: Arc<InMemorySearchIndex>,
    pub storage: Arc<dyn ObjectStorage>,
    pub config: Config,
    _storage_dir: TempDir,
}

/// Build a test application, or `None` when no database is configured.
pub async fn try_test_app() -> Option<TestApp> {
    if std::env::var("DATABASE_URL").is_err() {
        eprintln!("skipping: DATABASE_URL is not set");
        return None;
    }
    let config = Config::from_env().expect("test config");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .expect("connect to test database");
    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .expect("run migrations");

    // Leftovers from aborted runs would otherwise be claimed by this
    // test's drain loop.
    sqlx::query("UPDATE outbox_events SET status = 'delivered' WHERE status IN ('pending', 'delivering')")
        .execute(&pool)
        .await
        .expect("scrub outbox");

    let storage_dir = TempDir::new().expect("storage dir");
    let storage: Arc<dyn ObjectStorage> = Arc::new(
        LocalStorage::new(storage_dir.path(), "http://localhost:8080/files".to_string())
            .await
            .expect("local storage"),
    );
    let search = Arc::new(InMemorySearchIndex::default());

    let services = build_services(pool, storage.clone(), search.clone(), &config);

    // Every consumer except the transcoding worker; tests simulate the
    // worker's outcome by publishing the processed event themselves.
    let mut registry = HandlerRegistry::new();
    registry.subscribe(Arc::new(CatalogProjector::new(services.songs.clone())));
    registry.subscribe(Arc::new(SearchProjector::new(search.clone())));
    registry.subscribe(Arc::new(MediaStatusProjector::new(
        services.media_files.clone(),
    )));
    registry.subscribe(Arc::new(MediaCleanup::new(
        services.media_files.clone(),
        storage.clone(),
        CleanupConfig {
            hls_bucket: config.hls_bucket.clone(),
            covers_bucket: config.covers_bucket.clone(),
        },
    )));
    let registry = Arc::new(registry);

    let server = TestServer::new(build_router(services.state.clone())).expect("test server");

    Some(TestApp {
        server,
        services,
        registry,
        search,
        storage,
        config,
        _storage_dir: storage_dir,
    })
}

impl TestApp {
    /// Dispatch every due outbox event through the registered consumers.
    pub async fn drain_outbox(&self) {
        while process_next(&self.services.outbox, &self.registry, 5, None)
            .await
            .expect("relay step")
        {}
    }

    pub async fn outbox_count_for_song(&self, event_type: &str, song_id: Uuid) -> i64 {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM outbox_events WHERE event_type = $1 AND payload->>'song_id' = $2",
        )
        .bind(event_type)
        .bind(song_id.to_string())
        .fetch_one(&self.services.state.pool)
        .await
        .expect("count outbox events");
        row.get("n")
    }

    pub async fn create_song(&self, title: &str, artist: &str, cover_key: Option<&str>) -> Uuid {
        let response = self
            .server
            .post("/api/songs")
            .json(&serde_json::json!({
                "title": title,
                "artist": artist,
                "album": "Test Album",
                "coverKey": cover_key,
            }))
            .await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        body["id"].as_str().unwrap().parse().unwrap()
    }
}
