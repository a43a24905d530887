//! Highlight analysis seam used by the job engine.

use async_trait::async_trait;
use std::path::Path;
use tracing::{info, warn};

use reel_models::Highlight;

use crate::client::GeminiClient;
use crate::parser::parse_highlights;

/// Finds interesting ranges in a source video.
///
/// Implementations swallow transport, service and parse failures and
/// return an empty list; deciding that "nothing found" is fatal belongs
/// to the caller.
#[async_trait]
pub trait HighlightAnalyzer: Send + Sync {
    async fn analyze(&self, source: &Path) -> Vec<Highlight>;
}

/// [`HighlightAnalyzer`] backed by Gemini.
pub struct GeminiAnalyzer {
    client: GeminiClient,
}

impl GeminiAnalyzer {
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HighlightAnalyzer for GeminiAnalyzer {
    async fn analyze(&self, source: &Path) -> Vec<Highlight> {
        let text = match self.client.analyze_video(source).await {
            Ok(text) => text,
            Err(e) => {
                warn!(source = %source.display(), "Gemini analysis failed: {}", e);
                return Vec::new();
            }
        };

        match parse_highlights(&text) {
            Ok(highlights) => {
                info!(source = %source.display(), count = highlights.len(), "Parsed highlights");
                highlights
            }
            Err(e) => {
                warn!(source = %source.display(), "Unusable analysis reply: {}", e);
                Vec::new()
            }
        }
    }
}
