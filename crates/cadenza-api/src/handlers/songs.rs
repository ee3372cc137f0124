//! Catalog song endpoints.

use axum::extract::{Path, State};
use axum::Json;
use cadenza_core::models::Song;
use cadenza_core::AppError;
use cadenza_services::CreateSongRequest;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::error::HttpAppError;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSongBody {
    #[validate(length(min = 1, max = 512))]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub album: String,
    pub cover_key: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SongResponse {
    pub id: Uuid,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub cover_key: Option<String>,
    pub hls_key: Option<String>,
    pub duration_seconds: f64,
    pub status: String,
}

impl From<Song> for SongResponse {
    fn from(song: Song) -> Self {
        SongResponse {
            id: song.id,
            title: song.title,
            artist: song.artist,
            album: song.album,
            cover_key: song.cover_key,
            hls_key: song.hls_key,
            duration_seconds: song.duration_seconds,
            status: song.status.as_str().to_string(),
        }
    }
}

pub async fn create_song(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateSongBody>,
) -> Result<Json<SongResponse>, HttpAppError> {
    body.validate()
        .map_err(|e| AppError::InvalidInput(e.to_string()))?;

    let song = state
        .catalog
        .create_song(CreateSongRequest {
            title: body.title,
            artist: body.artist,
            album: body.album,
            cover_key: body.cover_key,
        })
        .await?;

    Ok(Json(song.into()))
}

pub async fn list_songs(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<SongResponse>>, HttpAppError> {
    let songs = state.catalog.list_songs().await?;
    Ok(Json(songs.into_iter().map(Into::into).collect()))
}

pub async fn get_song(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SongResponse>, HttpAppError> {
    let song = state.catalog.get_song(id).await?;
    Ok(Json(song.into()))
}

pub async fn delete_song(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, HttpAppError> {
    state.catalog.delete_song(id).await?;
    Ok(Json(json!({ "success": true })))
}
