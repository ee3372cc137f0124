//! Search read path, proxied to the search collaborator.

use axum::extract::{Query, State};
use axum::Json;
use cadenza_core::models::SongDocument;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::HttpAppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<SongDocument>>, HttpAppError> {
    let hits = state.search.search(&query.q).await?;
    Ok(Json(hits))
}
