//! Upload endpoints: issue grants and confirm completed transfers.

use axum::extract::State;
use axum::Json;
use cadenza_core::AppError;
use cadenza_services::InitUpload;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::error::HttpAppError;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct InitUploadRequest {
    pub song_id: Option<Uuid>,
    #[validate(length(min = 1, max = 512))]
    pub file_name: String,
    #[validate(length(min = 1, max = 255))]
    pub content_type: String,
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitUploadResponse {
    pub upload_id: Uuid,
    pub upload_url: String,
    pub storage_key: String,
}

pub async fn init_upload(
    State(state): State<Arc<AppState>>,
    Json(request): Json<InitUploadRequest>,
) -> Result<Json<InitUploadResponse>, HttpAppError> {
    request
        .validate()
        .map_err(|e| AppError::InvalidInput(e.to_string()))?;

    let result = state
        .upload
        .init_upload(InitUpload {
            song_id: request.song_id,
            file_name: request.file_name,
            content_type: request.content_type,
            category: request.category,
        })
        .await?;

    Ok(Json(InitUploadResponse {
        upload_id: result.upload_id,
        upload_url: result.upload_url,
        storage_key: result.storage_key,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmUploadRequest {
    pub upload_id: Uuid,
}

pub async fn confirm_upload(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ConfirmUploadRequest>,
) -> Result<Json<serde_json::Value>, HttpAppError> {
    state.upload.confirm_upload(request.upload_id).await?;
    Ok(Json(json!({ "success": true })))
}
