//! Application state shared by the HTTP handlers.

use cadenza_services::{CatalogService, SearchIndex, UploadService};
use sqlx::PgPool;
use std::sync::Arc;

pub struct AppState {
    pub pool: PgPool,
    pub upload: UploadService,
    pub catalog: CatalogService,
    pub search: Arc<dyn SearchIndex>,
}
