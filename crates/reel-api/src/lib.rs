//! Axum HTTP and WebSocket server for highlight reels.
//!
//! This crate provides:
//! - Upload, library and job endpoints over the job engine
//! - Live per-job event streams over WebSocket
//! - Rate limiting and Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod ws;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
