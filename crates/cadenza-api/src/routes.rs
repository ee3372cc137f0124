//! Route configuration.

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{health, search, songs, upload};
use crate::state::AppState;

/// JSON request bodies only; actual file bytes go straight to storage via
/// presigned URLs.
const MAX_BODY_BYTES: usize = 1024 * 1024;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/media/upload/init", post(upload::init_upload))
        .route("/api/media/upload/confirm", post(upload::confirm_upload))
        .route("/api/songs", post(songs::create_song).get(songs::list_songs))
        .route(
            "/api/songs/{id}",
            get(songs::get_song).delete(songs::delete_song),
        )
        .route("/api/search", get(search::search))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}
