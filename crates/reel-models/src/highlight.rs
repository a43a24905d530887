//! Highlight models.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A candidate interesting segment of a source video, in whole seconds.
///
/// Highlights of one job may overlap and need not be ordered. A highlight
/// whose end is not after its start is kept as-is and skipped at assembly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Highlight {
    /// Start offset in seconds
    pub start: u32,

    /// End offset in seconds
    pub end: u32,

    /// Free-text label
    #[serde(default)]
    pub description: String,
}

impl Highlight {
    pub fn new(start: u32, end: u32, description: impl Into<String>) -> Self {
        Self {
            start,
            end,
            description: description.into(),
        }
    }

    /// Whether the range can be cut (`start < end`).
    pub fn is_usable(&self) -> bool {
        self.start < self.end
    }
}
