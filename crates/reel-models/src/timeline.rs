//! Timeline events recorded on a job.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Stage event names appended to a job timeline.
pub mod events {
    pub const VIDEO_UPLOADED: &str = "Video Uploaded";
    pub const MANUAL_CLIPS_SELECTED: &str = "Manual Clips Selected";
    pub const ANALYSIS_STARTED: &str = "Analysis Started";
    pub const ANALYSIS_COMPLETE: &str = "Analysis Complete";
    pub const ANALYSIS_FAILED: &str = "Analysis Failed";
    pub const PROCESSING_STARTED: &str = "Video Processing Started";
    pub const PROCESSING_COMPLETE: &str = "Processing Complete";
    pub const PROCESSING_FAILED: &str = "Processing Failed";
}

/// Status attached to a timeline event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TimelineStatus {
    InProgress,
    Completed,
    Failed,
}

/// Immutable record of one stage transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TimelineEvent {
    pub event: String,
    pub status: TimelineStatus,
    pub timestamp: DateTime<Utc>,
}

impl TimelineEvent {
    pub fn new(event: impl Into<String>, status: TimelineStatus) -> Self {
        Self {
            event: event.into(),
            status,
            timestamp: Utc::now(),
        }
    }
}
