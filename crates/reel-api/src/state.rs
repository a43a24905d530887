//! Application state.

use std::sync::Arc;

use reel_ai::{GeminiAnalyzer, GeminiClient};
use reel_engine::{EngineConfig, JobEngine, TokioSpawner};
use reel_media::{FfmpegTranscoder, HighlightAssembler};
use reel_models::EncodingConfig;
use reel_storage::{LocalStorage, StorageConfig};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub engine: JobEngine,
}

impl AppState {
    /// Wire the engine to Gemini, ffmpeg and local storage from the environment.
    pub async fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let storage = LocalStorage::open(StorageConfig::from_env()).await?;
        let engine_config = EngineConfig::from_env();

        let analyzer = GeminiAnalyzer::new(GeminiClient::from_env()?);
        let transcoder = FfmpegTranscoder::new(EncodingConfig::default())
            .with_timeout(engine_config.ffmpeg_timeout.as_secs());
        let assembler = HighlightAssembler::new(transcoder, engine_config.work_dir.clone());

        let engine = JobEngine::new(
            engine_config,
            storage,
            Arc::new(analyzer),
            Arc::new(assembler),
            Arc::new(TokioSpawner),
        );
        Ok(Self::from_parts(config, engine))
    }

    pub fn from_parts(config: ApiConfig, engine: JobEngine) -> Self {
        Self { config, engine }
    }

    pub fn storage(&self) -> &LocalStorage {
        self.engine.storage()
    }
}
