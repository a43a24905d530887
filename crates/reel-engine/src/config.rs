//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Work directory for per-job temporary segment files
    pub work_dir: PathBuf,
    /// Upper bound on one analysis stage
    pub analysis_timeout: Duration,
    /// Upper bound on one processing stage
    pub processing_timeout: Duration,
    /// Upper bound on a single ffmpeg invocation within a stage
    pub ffmpeg_timeout: Duration,
    /// Stages allowed to run at once across all jobs
    pub max_concurrent_stages: usize,
    /// Per-observer queue length before the observer is dropped
    pub observer_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("reel"),
            analysis_timeout: Duration::from_secs(900),
            processing_timeout: Duration::from_secs(3600),
            ffmpeg_timeout: Duration::from_secs(1800),
            max_concurrent_stages: 4,
            observer_buffer: 64,
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            work_dir: std::env::var("REEL_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            analysis_timeout: Duration::from_secs(
                std::env::var("ANALYSIS_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(900),
            ),
            processing_timeout: Duration::from_secs(
                std::env::var("PROCESSING_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
            ffmpeg_timeout: Duration::from_secs(
                std::env::var("FFMPEG_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1800),
            ),
            max_concurrent_stages: std::env::var("MAX_CONCURRENT_STAGES")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(4),
            observer_buffer: std::env::var("OBSERVER_BUFFER")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeouts_nest() {
        let config = EngineConfig::default();
        assert!(config.ffmpeg_timeout < config.processing_timeout);
        assert!(config.max_concurrent_stages > 0);
        assert!(config.work_dir.ends_with("reel"));
    }
}
