//! Segment extraction.

use std::path::Path;
use tracing::debug;

use reel_models::timestamp::format_seek;
use reel_models::EncodingConfig;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;

/// Build the command that cuts `[start, end)` out of `input` and re-encodes it.
///
/// Cut points rarely land on keyframes, so segments are always encoded
/// with the fixed profile instead of being stream-copied.
pub fn extract_command(
    input: &Path,
    output: &Path,
    start_secs: u32,
    end_secs: u32,
    encoding: &EncodingConfig,
) -> FfmpegCommand {
    let duration = end_secs.saturating_sub(start_secs) as f64;

    FfmpegCommand::new(input, output)
        .seek(start_secs as f64)
        .duration(duration)
        .map("0:v:0")
        .map("0:a:0?")
        .output_args(encoding.to_ffmpeg_args())
        .output_args(["-pix_fmt", "yuv420p", "-movflags", "+faststart"])
}

/// Cut one segment with the defensive re-encode profile.
pub async fn extract_segment(
    runner: &FfmpegRunner,
    input: &Path,
    output: &Path,
    start_secs: u32,
    end_secs: u32,
    encoding: &EncodingConfig,
) -> MediaResult<()> {
    debug!(
        "Extracting segment {}-{}: {} -> {}",
        format_seek(start_secs),
        format_seek(end_secs),
        input.display(),
        output.display()
    );

    let cmd = extract_command(input, output, start_secs, end_secs, encoding);
    runner.run(&cmd).await
}
