//! Storage configuration.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory holding uploaded source videos
    pub upload_dir: PathBuf,
    /// Directory holding produced reels
    pub processed_dir: PathBuf,
    /// URL prefix under which `processed_dir` is served
    pub static_url_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            processed_dir: PathBuf::from("processed"),
            static_url_prefix: "/static".to_string(),
        }
    }
}

impl StorageConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            upload_dir: std::env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            processed_dir: std::env::var("PROCESSED_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.processed_dir),
            static_url_prefix: std::env::var("STATIC_URL_PREFIX")
                .map(|p| p.trim_end_matches('/').to_string())
                .unwrap_or(defaults.static_url_prefix),
        }
    }

    /// Config rooted in one directory, with `uploads/` and `processed/` below it.
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            upload_dir: root.join("uploads"),
            processed_dir: root.join("processed"),
            ..Default::default()
        }
    }
}
