//! Gemini client configuration.

use std::time::Duration;

/// Configuration for [`crate::GeminiClient`].
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API key sent as the `key` query parameter
    pub api_key: String,
    /// Model used for generateContent
    pub model: String,
    /// API origin, without a trailing slash
    pub base_url: String,
    /// Delay between file state polls
    pub poll_interval: Duration,
    /// Polls before giving up on a file still in PROCESSING
    pub max_polls: u32,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gemini-1.5-pro-latest".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            poll_interval: Duration::from_secs(5),
            max_polls: 120,
            request_timeout: Duration::from_secs(300),
        }
    }
}

impl GeminiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: std::env::var("GEMINI_API_KEY").unwrap_or_default(),
            model: std::env::var("GEMINI_MODEL").unwrap_or(defaults.model),
            base_url: std::env::var("GEMINI_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            poll_interval: std::env::var("GEMINI_POLL_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
            max_polls: std::env::var("GEMINI_MAX_POLLS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_polls),
            request_timeout: std::env::var("GEMINI_REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
        }
    }

    /// Point the client at another origin (used by tests and proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_polls(mut self, max_polls: u32) -> Self {
        self.max_polls = max_polls;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = GeminiConfig::default();
        assert_eq!(config.model, "gemini-1.5-pro-latest");
        assert_eq!(config.poll_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let config = GeminiConfig::default().with_base_url("http://127.0.0.1:9000/");
        assert_eq!(config.base_url, "http://127.0.0.1:9000");
    }
}
