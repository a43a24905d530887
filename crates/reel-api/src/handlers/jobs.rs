//! Job submission and query handlers.

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use reel_models::{Highlight, Job, JobId, VideoId};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// One user-selected clip, in seconds.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ClipRange {
    pub start: f64,
    pub end: f64,
}

impl ClipRange {
    /// Widen to whole seconds so the chosen range is always covered.
    pub fn to_highlight(self) -> Highlight {
        let start = self.start.max(0.0).floor() as u32;
        let end = self.end.max(0.0).ceil() as u32;
        Highlight::new(start, end, "Manual selection")
    }
}

#[derive(Debug, Deserialize)]
pub struct ManualClipsRequest {
    pub clips: Vec<ClipRange>,
}

/// POST /process/:file_id
pub async fn process_video(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> ApiResult<Json<Job>> {
    Ok(Json(state.engine.submit(VideoId::from(file_id)).await?))
}

/// POST /analyze/:file_id
pub async fn analyze_video(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> ApiResult<Json<Job>> {
    Ok(Json(state.engine.submit_analysis(VideoId::from(file_id)).await?))
}

/// POST /process/manual/:file_id
pub async fn process_manual(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
    Json(request): Json<ManualClipsRequest>,
) -> ApiResult<Json<Job>> {
    if request.clips.is_empty() {
        return Err(ApiError::bad_request("No clips provided"));
    }
    let highlights = request.clips.into_iter().map(ClipRange::to_highlight).collect();
    Ok(Json(
        state
            .engine
            .submit_manual(VideoId::from(file_id), highlights)
            .await?,
    ))
}

/// POST /jobs/:job_id/process
pub async fn process_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<Job>> {
    Ok(Json(
        state
            .engine
            .submit_processing(&JobId::from_string(job_id))
            .await?,
    ))
}

/// GET /jobs/:job_id
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<Job>> {
    Ok(Json(state.engine.get(&JobId::from_string(job_id)).await?))
}
