//! Engine error types.
//!
//! These are caller-facing validation failures. Stage failures never
//! surface here; they are recorded on the job instead.

use thiserror::Error;

use reel_models::{JobId, JobStatus, VideoId};

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Source video not found: {0}")]
    SourceNotFound(VideoId),

    #[error("Job {0} has no highlights to process")]
    MissingHighlights(JobId),

    #[error("Job {job_id} already has a stage scheduled or running (status {status})")]
    StageInProgress { job_id: JobId, status: JobStatus },

    #[error("Invalid highlights: {0}")]
    InvalidHighlights(String),

    #[error("Observer disconnected before subscription completed")]
    ObserverGone,

    #[error("Storage error: {0}")]
    Storage(#[from] reel_storage::StorageError),
}

impl EngineError {
    pub fn invalid_highlights(msg: impl Into<String>) -> Self {
        Self::InvalidHighlights(msg.into())
    }

    /// Whether the error means a referenced entity does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::JobNotFound(_) | EngineError::SourceNotFound(_))
    }
}
