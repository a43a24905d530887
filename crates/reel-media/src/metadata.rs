//! Best-effort metadata extraction for uploaded videos.

use chrono::{DateTime, Utc};
use reel_models::timestamp::format_duration;
use reel_models::video::bytes_to_mb;
use reel_models::VideoMetadata;
use std::path::Path;
use tracing::warn;

use crate::probe::{probe_media, MediaProbe};

/// Probe `path` and describe it.
///
/// Never fails: a probe error is reported in the `error` field and only
/// the file-level facts are filled in.
pub async fn extract_metadata(path: &Path, display_name: &str) -> VideoMetadata {
    let (file_size, upload_time) = match tokio::fs::metadata(path).await {
        Ok(meta) => {
            let created = meta
                .created()
                .or_else(|_| meta.modified())
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            (meta.len(), created)
        }
        Err(e) => {
            warn!(path = %path.display(), "Failed to stat video: {}", e);
            (0, Utc::now())
        }
    };

    match probe_media(path).await {
        Ok(probe) => build_metadata(display_name, file_size, upload_time, Some(&probe), None),
        Err(e) => {
            warn!(path = %path.display(), "Failed to probe video: {}", e);
            build_metadata(display_name, file_size, upload_time, None, Some(e.to_string()))
        }
    }
}

/// Assemble metadata from file facts and an optional probe result.
pub fn build_metadata(
    filename: &str,
    file_size: u64,
    upload_time: DateTime<Utc>,
    probe: Option<&MediaProbe>,
    error: Option<String>,
) -> VideoMetadata {
    let mut meta = VideoMetadata {
        filename: filename.to_string(),
        file_size,
        file_size_mb: bytes_to_mb(file_size),
        duration: 0.0,
        duration_formatted: format_duration(0.0),
        upload_time,
        error,
        ..Default::default()
    };

    let Some(probe) = probe else {
        return meta;
    };

    meta.duration = probe.duration;
    meta.duration_formatted = format_duration(probe.duration);
    meta.format = probe.format_name.clone();

    if let Some(video) = probe.video_stream() {
        meta.width = video.width;
        meta.height = video.height;
        meta.codec = video.codec.clone();
        meta.fps = video.fps.map(|f| (f * 100.0).round() / 100.0);
        meta.bitrate = video.bit_rate.or(probe.bit_rate);
    }

    if let Some(audio) = probe.audio_stream() {
        meta.audio_codec = audio.codec.clone();
        meta.audio_channels = audio.channels;
        meta.audio_sample_rate = audio.sample_rate;
    }

    meta
}
