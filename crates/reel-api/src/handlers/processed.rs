//! Processed output handlers.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use reel_storage::ProcessedFile;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Serialize)]
pub struct ProcessedListResponse {
    pub files: Vec<ProcessedFile>,
}

#[derive(Serialize)]
pub struct DeleteProcessedResponse {
    pub message: String,
}

/// GET /processed
pub async fn list_processed(State(state): State<AppState>) -> ApiResult<Json<ProcessedListResponse>> {
    let files = state.storage().list_processed().await?;
    Ok(Json(ProcessedListResponse { files }))
}

/// DELETE /processed/:filename
pub async fn delete_processed(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> ApiResult<Json<DeleteProcessedResponse>> {
    state.storage().delete_processed(&filename).await?;
    Ok(Json(DeleteProcessedResponse {
        message: format!("Deleted {}", filename),
    }))
}
