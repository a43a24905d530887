//! Job entity owned by the orchestration engine.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::{Highlight, JobStatus, TimelineEvent, TimelineStatus, VideoId};

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One highlight-reel job for one source video.
///
/// `error` is only ever set together with `Failed` and `output_url` only
/// together with `Completed`; the transition methods keep both exact.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Source video this job was submitted for
    #[serde(rename = "file_id")]
    pub video_id: VideoId,

    /// Current status
    pub status: JobStatus,

    /// Highlights from analysis or manual selection
    #[serde(default)]
    pub highlights: Vec<Highlight>,

    /// Append-only stage history
    #[serde(default)]
    pub timeline: Vec<TimelineEvent>,

    /// Failure reason, present only when failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Public URL of the produced reel, present only when completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_url: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a new queued job for a source video.
    pub fn new(video_id: VideoId) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            video_id,
            status: JobStatus::Queued,
            highlights: Vec::new(),
            timeline: Vec::new(),
            error: None,
            output_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a timeline event and return a copy of it.
    pub fn push_event(&mut self, event: impl Into<String>, status: TimelineStatus) -> TimelineEvent {
        let event = TimelineEvent::new(event, status);
        self.timeline.push(event.clone());
        self.updated_at = Utc::now();
        event
    }

    /// Enter the analysis stage.
    pub fn start_analysis(&mut self) {
        self.status = JobStatus::Analyzing;
        self.error = None;
        self.output_url = None;
        self.updated_at = Utc::now();
    }

    /// Replace the highlights with a fresh analysis result.
    pub fn set_highlights(&mut self, highlights: Vec<Highlight>) {
        self.highlights = highlights;
        self.updated_at = Utc::now();
    }

    /// Enter the processing stage.
    pub fn start_processing(&mut self) {
        self.status = JobStatus::Processing;
        self.updated_at = Utc::now();
    }

    /// Return to `Queued` ahead of a stage re-run, clearing terminal fields.
    pub fn requeue(&mut self) {
        self.status = JobStatus::Queued;
        self.error = None;
        self.output_url = None;
        self.updated_at = Utc::now();
    }

    /// Mark the job as completed with its output.
    pub fn complete(&mut self, output_url: impl Into<String>) {
        self.status = JobStatus::Completed;
        self.output_url = Some(output_url.into());
        self.error = None;
        self.updated_at = Utc::now();
    }

    /// Mark the job as failed.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.error = Some(error.into());
        self.output_url = None;
        self.updated_at = Utc::now();
    }

    /// Whether any stored highlight can be cut.
    pub fn has_usable_highlights(&self) -> bool {
        self.highlights.iter().any(Highlight::is_usable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_is_queued_and_empty() {
        let job = Job::new(VideoId::from("vid"));
        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.highlights.is_empty());
        assert!(job.timeline.is_empty());
        assert!(job.error.is_none());
        assert!(job.output_url.is_none());
    }

    #[test]
    fn test_terminal_fields_are_exclusive() {
        let mut job = Job::new(VideoId::from("vid"));
        job.fail("boom");
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("boom"));

        job.requeue();
        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.error.is_none());

        job.complete("/static/out.mp4");
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.error.is_none());
        assert_eq!(job.output_url.as_deref(), Some("/static/out.mp4"));
    }

    #[test]
    fn test_push_event_appends_in_order() {
        let mut job = Job::new(VideoId::from("vid"));
        job.push_event("first", TimelineStatus::Completed);
        job.push_event("second", TimelineStatus::InProgress);
        let names: Vec<_> = job.timeline.iter().map(|e| e.event.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn test_serializes_source_as_file_id() {
        let job = Job::new(VideoId::from("abc"));
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["file_id"], "abc");
        assert_eq!(json["status"], "queued");
        assert!(json.get("error").is_none());
    }
}
