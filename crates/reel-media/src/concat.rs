//! Concatenation of segments and the source video.
//!
//! Two strategies: the concat demuxer with stream copy (fast, needs
//! matching codec parameters) and a `filter_complex` concat that
//! re-encodes every input to the first video's geometry.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use reel_models::EncodingConfig;

use crate::command::FfmpegCommand;
use crate::probe::MediaProbe;

/// How the inputs are joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcatMode {
    Copy,
    Reencode,
}

impl ConcatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConcatMode::Copy => "copy",
            ConcatMode::Reencode => "reencode",
        }
    }
}

impl std::fmt::Display for ConcatMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Geometry every input is normalized to during a re-encode concat.
const FALLBACK_WIDTH: u32 = 1280;
const FALLBACK_HEIGHT: u32 = 720;
const FALLBACK_FPS: f64 = 30.0;
const AUDIO_SAMPLE_RATE: u32 = 44100;

/// Render the concat demuxer list file.
pub fn concat_list(files: &[PathBuf]) -> String {
    files
        .iter()
        .map(|p| {
            // Single quotes are closed, escaped and reopened
            let escaped = p.to_string_lossy().replace('\'', r"'\''");
            format!("file '{}'\n", escaped)
        })
        .collect()
}

/// Stream-copy concat over a list file written by [`concat_list`].
pub fn copy_command(list_file: &Path, output: &Path) -> FfmpegCommand {
    FfmpegCommand::new(list_file, output)
        .input_args(["-f", "concat", "-safe", "0"])
        .copy_streams()
        .output_args(["-movflags", "+faststart"])
}

/// Re-encode concat of `inputs`, normalized to the first video stream.
///
/// `probes` must be index-aligned with `inputs`. Inputs without audio get
/// generated silence when any other input carries audio.
pub fn reencode_command(
    inputs: &[PathBuf],
    probes: &[MediaProbe],
    output: &Path,
    encoding: &EncodingConfig,
) -> FfmpegCommand {
    let filter = build_concat_filter(probes);
    let with_audio = probes.iter().any(MediaProbe::has_audio);

    let mut iter = inputs.iter();
    let mut cmd = match iter.next() {
        Some(first) => FfmpegCommand::new(first, output),
        None => FfmpegCommand::new("", output),
    };
    for input in iter {
        cmd = cmd.add_input(input);
    }

    cmd = cmd.filter_complex(filter).map("[outv]");
    cmd = cmd.output_args(encoding.video_args());
    if with_audio {
        cmd = cmd.map("[outa]").output_args(encoding.audio_args());
    }
    cmd.output_args(["-pix_fmt", "yuv420p", "-movflags", "+faststart"])
}

/// Build the `filter_complex` graph joining every probed input.
pub fn build_concat_filter(probes: &[MediaProbe]) -> String {
    let (width, height, fps) = target_geometry(probes);
    let with_audio = probes.iter().any(MediaProbe::has_audio);

    let mut graph = String::new();
    let mut labels = String::new();

    for (i, probe) in probes.iter().enumerate() {
        let _ = write!(
            graph,
            "[{i}:v:0]scale={width}:{height}:force_original_aspect_ratio=decrease,\
             pad={width}:{height}:(ow-iw)/2:(oh-ih)/2,setsar=1,fps={fps},format=yuv420p[v{i}];"
        );
        let _ = write!(labels, "[v{i}]");

        if with_audio {
            if probe.has_audio() {
                let _ = write!(
                    graph,
                    "[{i}:a:0]aformat=sample_rates={AUDIO_SAMPLE_RATE}:channel_layouts=stereo,\
                     aresample=async=1[a{i}];"
                );
            } else {
                let duration = probe.duration.max(0.1);
                let _ = write!(
                    graph,
                    "anullsrc=channel_layout=stereo:sample_rate={AUDIO_SAMPLE_RATE},\
                     atrim=duration={duration:.3}[a{i}];"
                );
            }
            let _ = write!(labels, "[a{i}]");
        }
    }

    let audio_flag = if with_audio { 1 } else { 0 };
    let _ = write!(
        graph,
        "{labels}concat=n={}:v=1:a={audio_flag}[outv]",
        probes.len()
    );
    if with_audio {
        graph.push_str("[outa]");
    }
    graph
}

fn target_geometry(probes: &[MediaProbe]) -> (u32, u32, String) {
    let video = probes.iter().find_map(MediaProbe::video_stream);

    let even = |v: u32| if v % 2 == 0 { v } else { v + 1 };
    let width = video.and_then(|v| v.width).filter(|w| *w > 0).map(even);
    let height = video.and_then(|v| v.height).filter(|h| *h > 0).map(even);
    let fps = video.and_then(|v| v.fps).unwrap_or(FALLBACK_FPS);

    (
        width.unwrap_or(FALLBACK_WIDTH),
        height.unwrap_or(FALLBACK_HEIGHT),
        format!("{:.3}", fps),
    )
}
