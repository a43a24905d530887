//! FFmpeg CLI wrapper and highlight reel assembly.
//!
//! This crate provides:
//! - A command builder and runner for ffmpeg with timeouts
//! - ffprobe parsing and best-effort video metadata
//! - The [`Transcoder`] seam with an ffmpeg-backed implementation
//! - [`HighlightAssembler`], which cuts highlights and stitches the reel

pub mod assembler;
pub mod clip;
pub mod command;
pub mod concat;
pub mod error;
pub mod fs_utils;
pub mod metadata;
pub mod probe;
pub mod transcoder;

pub use assembler::{AssemblyReport, HighlightAssembler, MediaAssembler};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use concat::ConcatMode;
pub use error::{MediaError, MediaResult};
pub use metadata::extract_metadata;
pub use probe::{probe_media, MediaProbe, StreamInfo, StreamKind};
pub use transcoder::{FfmpegTranscoder, Transcoder};
