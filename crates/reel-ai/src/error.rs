//! Analysis client error types.

use thiserror::Error;

pub type AiResult<T> = Result<T, AiError>;

/// Failure to turn analysis text into highlights.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("analysis response is empty")]
    Empty,

    #[error("analysis response is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("analysis response has an unexpected shape: {0}")]
    Shape(String),
}

#[derive(Debug, Error)]
pub enum AiError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Gemini API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("File upload failed: {0}")]
    Upload(String),

    #[error("Remote file processing failed: {0}")]
    FileFailed(String),

    #[error("Remote file still processing after {0} polls")]
    NotReady(u32),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl From<reqwest::Error> for AiError {
    fn from(err: reqwest::Error) -> Self {
        // request URLs are dropped from messages that end up in logs
        Self::Network(err.without_url())
    }
}

impl AiError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn upload(message: impl Into<String>) -> Self {
        Self::Upload(message.into())
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }
}
