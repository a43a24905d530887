//! Transcoding boundary used by the assembler.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use reel_models::EncodingConfig;

use crate::clip::extract_segment;
use crate::command::FfmpegRunner;
use crate::concat::{concat_list, copy_command, reencode_command, ConcatMode};
use crate::error::{MediaError, MediaResult};
use crate::probe::{probe_media, MediaProbe};

/// Operations the assembler needs from a transcoding tool.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Cut `[start_secs, end_secs)` of `input` into `output`, re-encoded.
    async fn extract(&self, input: &Path, start_secs: u32, end_secs: u32, output: &Path) -> MediaResult<()>;

    /// Join `inputs` in order into `output`. `scratch` holds helper files.
    async fn concatenate(
        &self,
        inputs: &[PathBuf],
        output: &Path,
        mode: ConcatMode,
        scratch: &Path,
    ) -> MediaResult<()>;

    /// Inspect a media file.
    async fn probe(&self, path: &Path) -> MediaResult<MediaProbe>;
}

/// [`Transcoder`] backed by the ffmpeg and ffprobe binaries.
#[derive(Debug, Clone, Default)]
pub struct FfmpegTranscoder {
    runner: FfmpegRunner,
    encoding: EncodingConfig,
}

impl FfmpegTranscoder {
    pub fn new(encoding: EncodingConfig) -> Self {
        Self {
            runner: FfmpegRunner::new(),
            encoding,
        }
    }

    /// Kill any single ffmpeg invocation running longer than `secs`.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.runner = self.runner.with_timeout(secs);
        self
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn extract(&self, input: &Path, start_secs: u32, end_secs: u32, output: &Path) -> MediaResult<()> {
        extract_segment(&self.runner, input, output, start_secs, end_secs, &self.encoding).await
    }

    async fn concatenate(
        &self,
        inputs: &[PathBuf],
        output: &Path,
        mode: ConcatMode,
        scratch: &Path,
    ) -> MediaResult<()> {
        if inputs.is_empty() {
            return Err(MediaError::internal("nothing to concatenate"));
        }

        match mode {
            ConcatMode::Copy => {
                let list_file = scratch.join("concat.txt");
                tokio::fs::write(&list_file, concat_list(inputs)).await?;
                debug!("Concatenating {} inputs with stream copy", inputs.len());
                self.runner.run(&copy_command(&list_file, output)).await
            }
            ConcatMode::Reencode => {
                let mut probes = Vec::with_capacity(inputs.len());
                for input in inputs {
                    probes.push(probe_media(input).await?);
                }
                if let Some(idx) = probes.iter().position(|p| !p.has_video()) {
                    return Err(MediaError::invalid_video(format!(
                        "{} has no video stream",
                        inputs[idx].display()
                    )));
                }
                debug!("Concatenating {} inputs with re-encode", inputs.len());
                let cmd = reencode_command(inputs, &probes, output, &self.encoding);
                self.runner.run(&cmd).await
            }
        }
    }

    async fn probe(&self, path: &Path) -> MediaResult<MediaProbe> {
        probe_media(path).await
    }
}
