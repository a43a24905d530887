//! Shared data models for the highlight reel service.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, job status and the per-job timeline
//! - Highlights produced by analysis or chosen manually
//! - Source video identifiers and probed metadata
//! - Encoding configuration for the defensive re-encode profile
//! - WebSocket message schemas

pub mod encoding;
pub mod highlight;
pub mod job;
pub mod job_status;
pub mod timeline;
pub mod timestamp;
pub mod video;
pub mod ws;

// Re-export common types
pub use encoding::EncodingConfig;
pub use highlight::Highlight;
pub use job::{Job, JobId};
pub use job_status::JobStatus;
pub use timeline::{TimelineEvent, TimelineStatus};
pub use video::{VideoId, VideoMetadata};
pub use ws::{LogLevel, WsMessage, WsMessageType};
