//! Source video handlers.

use std::io;

use axum::extract::{Multipart, Path, State};
use axum::Json;
use futures::TryStreamExt;
use serde::Serialize;
use tokio_util::io::StreamReader;
use tracing::info;

use reel_media::extract_metadata;
use reel_models::{VideoId, VideoMetadata};
use reel_storage::StoredVideo;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Multipart field carrying the video.
const FILE_FIELD: &str = "file";

/// An uploaded source video with its probed metadata.
#[derive(Serialize)]
pub struct VideoResponse {
    pub id: VideoId,
    pub filename: String,
    pub path: String,
    pub metadata: VideoMetadata,
}

impl VideoResponse {
    async fn describe(video: StoredVideo) -> Self {
        let metadata = extract_metadata(&video.path, &video.filename).await;
        Self {
            id: video.id,
            filename: video.filename,
            path: video.path.to_string_lossy().into_owned(),
            metadata,
        }
    }
}

#[derive(Serialize)]
pub struct VideoListResponse {
    pub videos: Vec<VideoResponse>,
}

#[derive(Serialize)]
pub struct DeleteVideoResponse {
    pub message: String,
    pub jobs_removed: usize,
}

/// POST /upload
pub async fn upload_video(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<VideoResponse>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ApiError::bad_request("Upload is missing a file name"))?;

        let body = field.map_err(|e| io::Error::new(io::ErrorKind::Other, e));
        let reader = StreamReader::new(body);
        tokio::pin!(reader);

        let stored = state.storage().save_upload(&filename, &mut reader).await?;
        info!(video_id = %stored.id, filename = %stored.filename, "Upload saved");

        let response = VideoResponse::describe(stored).await;
        metrics::record_upload_bytes(response.metadata.file_size);
        return Ok(Json(response));
    }

    Err(ApiError::bad_request(format!(
        "Multipart field '{}' is required",
        FILE_FIELD
    )))
}

/// GET /videos
pub async fn list_videos(State(state): State<AppState>) -> ApiResult<Json<VideoListResponse>> {
    let uploads = state.storage().list_uploads().await?;
    let mut videos = Vec::with_capacity(uploads.len());
    for video in uploads {
        videos.push(VideoResponse::describe(video).await);
    }
    Ok(Json(VideoListResponse { videos }))
}

/// GET /videos/:file_id/metadata
pub async fn get_video_metadata(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> ApiResult<Json<VideoMetadata>> {
    let video = state
        .storage()
        .find_upload(&VideoId::from(file_id.as_str()))
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Video not found: {}", file_id)))?;
    Ok(Json(extract_metadata(&video.path, &video.filename).await))
}

/// DELETE /videos/:file_id
pub async fn delete_video(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> ApiResult<Json<DeleteVideoResponse>> {
    let video_id = VideoId::from(file_id);
    let video = state.storage().delete_upload(&video_id).await?;
    let jobs_removed = state.engine.forget_source(&video_id).await;

    Ok(Json(DeleteVideoResponse {
        message: format!("Deleted {}", video.filename),
        jobs_removed,
    }))
}
