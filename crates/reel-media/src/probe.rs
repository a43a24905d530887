//! FFprobe media information.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult};

/// Kind of an elementary stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Video,
    Audio,
    Other,
}

/// One stream reported by ffprobe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub kind: StreamKind,
    pub codec: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
    pub bit_rate: Option<u64>,
    pub channels: Option<u32>,
    pub sample_rate: Option<u32>,
}

/// Container-level facts plus the stream list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaProbe {
    /// Duration in seconds (0 when unknown)
    pub duration: f64,
    pub format_name: Option<String>,
    pub bit_rate: Option<u64>,
    pub size: Option<u64>,
    pub streams: Vec<StreamInfo>,
}

impl MediaProbe {
    pub fn video_stream(&self) -> Option<&StreamInfo> {
        self.streams.iter().find(|s| s.kind == StreamKind::Video)
    }

    pub fn audio_stream(&self) -> Option<&StreamInfo> {
        self.streams.iter().find(|s| s.kind == StreamKind::Audio)
    }

    pub fn has_video(&self) -> bool {
        self.video_stream().is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.audio_stream().is_some()
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
    bit_rate: Option<String>,
    format_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    bit_rate: Option<String>,
    channels: Option<u32>,
    sample_rate: Option<String>,
    duration: Option<String>,
}

/// Probe a media file.
pub async fn probe_media(path: impl AsRef<Path>) -> MediaResult<MediaProbe> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    check_ffprobe()?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: format!("ffprobe exited with {:?}", output.status.code()),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    parse_probe_output(&output.stdout)
}

/// Parse ffprobe's `-print_format json -show_format -show_streams` output.
pub fn parse_probe_output(bytes: &[u8]) -> MediaResult<MediaProbe> {
    let probe: FfprobeOutput = serde_json::from_slice(bytes)?;

    let streams: Vec<StreamInfo> = probe.streams.iter().map(convert_stream).collect();

    let format = probe.format.as_ref();
    let mut duration = format
        .and_then(|f| f.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    // Some muxers only report duration on the streams
    if duration <= 0.0 {
        duration = probe
            .streams
            .iter()
            .filter_map(|s| s.duration.as_deref())
            .filter_map(|d| d.parse::<f64>().ok())
            .fold(0.0, f64::max);
    }

    Ok(MediaProbe {
        duration,
        format_name: format.and_then(|f| f.format_name.clone()),
        bit_rate: format
            .and_then(|f| f.bit_rate.as_deref())
            .and_then(|b| b.parse().ok()),
        size: format.and_then(|f| f.size.as_deref()).and_then(|s| s.parse().ok()),
        streams,
    })
}

fn convert_stream(stream: &FfprobeStream) -> StreamInfo {
    let kind = match stream.codec_type.as_deref() {
        Some("video") => StreamKind::Video,
        Some("audio") => StreamKind::Audio,
        _ => StreamKind::Other,
    };

    let fps = if kind == StreamKind::Video {
        stream
            .r_frame_rate
            .as_deref()
            .and_then(parse_frame_rate)
            .or_else(|| stream.avg_frame_rate.as_deref().and_then(parse_frame_rate))
    } else {
        None
    };

    StreamInfo {
        kind,
        codec: stream.codec_name.clone(),
        width: stream.width,
        height: stream.height,
        fps,
        bit_rate: stream.bit_rate.as_deref().and_then(|b| b.parse().ok()),
        channels: stream.channels,
        sample_rate: stream.sample_rate.as_deref().and_then(|r| r.parse().ok()),
    }
}

/// Parse frame rate string (e.g., "30/1" or "29.97").
pub fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 && num > 0.0 {
            return Some(num / den);
        }
        return None;
    }
    s.parse().ok().filter(|v: &f64| *v > 0.0)
}
