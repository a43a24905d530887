//! WebSocket message types.
//!
//! Observers receive `log` narration interleaved with `timeline` snapshots.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::TimelineEvent;

/// WebSocket message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum WsMessageType {
    Log,
    Timeline,
}

impl WsMessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WsMessageType::Log => "log",
            WsMessageType::Timeline => "timeline",
        }
    }
}

/// Severity of a log message shown to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Success,
}

/// WebSocket message envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// Free-text progress narration
    Log {
        level: LogLevel,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Full ordered timeline of the job so far
    Timeline { timeline: Vec<TimelineEvent> },
}

impl WsMessage {
    /// Create a log message.
    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        WsMessage::Log {
            level,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::log(LogLevel::Info, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::log(LogLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::log(LogLevel::Error, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::log(LogLevel::Success, message)
    }

    /// Create a timeline snapshot message.
    pub fn timeline(timeline: Vec<TimelineEvent>) -> Self {
        WsMessage::Timeline { timeline }
    }

    /// Get the message type.
    pub fn message_type(&self) -> WsMessageType {
        match self {
            WsMessage::Log { .. } => WsMessageType::Log,
            WsMessage::Timeline { .. } => WsMessageType::Timeline,
        }
    }
}
