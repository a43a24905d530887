//! Job lifecycle status.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Job processing status.
///
/// `Queued -> Analyzing -> {Processing | Failed}` and
/// `Processing -> {Completed | Failed}`. A re-run entry point may move a
/// job back to `Queued`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is waiting for its next stage
    #[default]
    Queued,
    /// Analysis stage is running
    Analyzing,
    /// Cut/stitch stage is running
    Processing,
    /// Output produced
    Completed,
    /// A stage failed
    Failed,
}

impl JobStatus {
    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Analyzing => "analyzing",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more transitions without a re-run).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Check if a stage is currently running for this job.
    pub fn is_running(&self) -> bool {
        matches!(self, JobStatus::Analyzing | JobStatus::Processing)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
