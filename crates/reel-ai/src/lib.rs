//! Highlight analysis for the reel service.
//!
//! Uploads a source video to Gemini, asks for interesting moments and
//! parses the reply into [`reel_models::Highlight`]s.

pub mod analyzer;
pub mod client;
pub mod config;
pub mod error;
pub mod parser;
pub mod prompt;

pub use analyzer::{GeminiAnalyzer, HighlightAnalyzer};
pub use client::{FileState, GeminiClient, RemoteFile};
pub use config::GeminiConfig;
pub use error::{AiError, AiResult, ParseError};
pub use parser::{parse_highlights, time_to_seconds};
