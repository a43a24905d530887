//! API routes.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;

use crate::handlers::{
    analyze_video, delete_processed, delete_video, get_job, get_video_metadata, health,
    list_processed, list_videos, process_job, process_manual, process_video, root, upload_video,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, rate_limit_middleware, request_id, request_logging, RateLimiterCache};
use crate::state::AppState;
use crate::ws::ws_job;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let upload_routes = Router::new()
        .route("/upload", post(upload_video))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.config.max_upload_size));

    let video_routes = Router::new()
        .route("/videos", get(list_videos))
        .route("/videos/:file_id", delete(delete_video))
        .route("/videos/:file_id/metadata", get(get_video_metadata));

    let job_routes = Router::new()
        .route("/process/:file_id", post(process_video))
        .route("/process/manual/:file_id", post(process_manual))
        .route("/analyze/:file_id", post(analyze_video))
        .route("/jobs/:job_id", get(get_job))
        .route("/jobs/:job_id/process", post(process_job));

    let processed_routes = Router::new()
        .route("/processed", get(list_processed))
        .route("/processed/:filename", delete(delete_processed));

    let rate_limiter = Arc::new(RateLimiterCache::new(state.config.rate_limit_rps));

    let api_routes = Router::new()
        .merge(upload_routes)
        .merge(video_routes)
        .merge(job_routes)
        .merge(processed_routes)
        .layer(middleware::from_fn_with_state(rate_limiter, rate_limit_middleware));

    let ws_routes = Router::new().route("/ws/:job_id", get(ws_job));

    let health_routes = Router::new()
        .route("/", get(root))
        .route("/health", get(health));

    let metrics_routes = match metrics_handle {
        Some(handle) => Router::new().route("/metrics", get(move || async move { handle.render() })),
        None => Router::new(),
    };

    let static_files = ServeDir::new(state.storage().processed_dir());

    Router::new()
        .merge(api_routes)
        .merge(ws_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .nest_service("/static", static_files)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
