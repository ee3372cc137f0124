//! Application services: upload orchestration, catalog, search indexing,
//! and the deletion cleanup saga.

pub mod catalog;
pub mod media;
pub mod search;
pub mod testing;

pub use catalog::{CatalogProjector, CatalogService, CreateSongRequest};
pub use media::cleanup::{CleanupConfig, MediaCleanup};
pub use media::status::MediaStatusProjector;
pub use media::upload::{InitUpload, InitUploadResult, UploadConfig, UploadService};
pub use search::client::{SearchIndex, TypesenseSearchIndex};
pub use search::indexer::SearchProjector;
