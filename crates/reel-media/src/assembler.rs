//! Highlight reel assembly.
//!
//! Cuts every usable highlight into its own re-encoded segment, then joins
//! the segments followed by the full source. A stream-copy join is tried
//! first and re-probed; any failure or implausible result falls back to a
//! re-encoding join. Segment files live in a per-run temporary directory
//! that is removed on every exit path.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use reel_models::Highlight;

use crate::concat::ConcatMode;
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::move_into_place;
use crate::transcoder::Transcoder;

/// Joined output must cover at least this share of the summed input durations.
const MIN_DURATION_RATIO: f64 = 0.9;

/// What a successful assembly did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyReport {
    pub segments_extracted: usize,
    pub segments_skipped: usize,
    pub concat_mode: ConcatMode,
}

/// Produces a highlight reel for a source video.
#[async_trait]
pub trait MediaAssembler: Send + Sync {
    /// Build `output` from `highlights` cut out of `source`, followed by `source`.
    ///
    /// `output` is only written when the whole assembly succeeds.
    async fn process_highlights(
        &self,
        source: &Path,
        highlights: &[Highlight],
        output: &Path,
    ) -> MediaResult<AssemblyReport>;
}

/// [`MediaAssembler`] driving any [`Transcoder`].
pub struct HighlightAssembler<T> {
    transcoder: T,
    work_dir: PathBuf,
}

impl<T: Transcoder> HighlightAssembler<T> {
    /// `work_dir` is where per-run temporary directories are created.
    pub fn new(transcoder: T, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            transcoder,
            work_dir: work_dir.into(),
        }
    }

    async fn scratch_dir(&self, output: &Path) -> MediaResult<TempDir> {
        tokio::fs::create_dir_all(&self.work_dir).await?;
        let stem = output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "reel".to_string());
        Ok(tempfile::Builder::new()
            .prefix(&format!("reel-{}-", stem))
            .tempdir_in(&self.work_dir)?)
    }

    /// Sum of the probed input durations, `None` when any is unknown.
    async fn expected_duration(&self, inputs: &[PathBuf]) -> Option<f64> {
        let mut total = 0.0;
        for input in inputs {
            match self.transcoder.probe(input).await {
                Ok(probe) if probe.duration > 0.0 => total += probe.duration,
                _ => return None,
            }
        }
        Some(total)
    }

    async fn validate(&self, joined: &Path, expected: Option<f64>) -> MediaResult<()> {
        let probe = self.transcoder.probe(joined).await?;
        if !probe.has_video() {
            return Err(MediaError::invalid_video("joined output has no video stream"));
        }
        if probe.duration <= 0.0 {
            return Err(MediaError::invalid_video("joined output has no duration"));
        }
        if let Some(expected) = expected {
            if probe.duration < expected * MIN_DURATION_RATIO {
                return Err(MediaError::invalid_video(format!(
                    "joined output is {:.1}s, expected about {:.1}s",
                    probe.duration, expected
                )));
            }
        }
        Ok(())
    }

    async fn join(
        &self,
        inputs: &[PathBuf],
        joined: &Path,
        mode: ConcatMode,
        scratch: &Path,
        expected: Option<f64>,
    ) -> MediaResult<()> {
        self.transcoder.concatenate(inputs, joined, mode, scratch).await?;
        self.validate(joined, expected).await
    }
}

#[async_trait]
impl<T: Transcoder> MediaAssembler for HighlightAssembler<T> {
    async fn process_highlights(
        &self,
        source: &Path,
        highlights: &[Highlight],
        output: &Path,
    ) -> MediaResult<AssemblyReport> {
        let usable: Vec<&Highlight> = highlights.iter().filter(|h| h.is_usable()).collect();
        if usable.is_empty() {
            return Err(MediaError::NoUsableHighlights);
        }
        if usable.len() < highlights.len() {
            debug!(
                "Ignoring {} highlights with end <= start",
                highlights.len() - usable.len()
            );
        }

        let scratch = self.scratch_dir(output).await?;

        let mut segments = Vec::with_capacity(usable.len());
        for (index, highlight) in usable.iter().enumerate() {
            let segment = scratch.path().join(format!("segment_{:03}.mp4", index));
            match self
                .transcoder
                .extract(source, highlight.start, highlight.end, &segment)
                .await
            {
                Ok(()) => segments.push(segment),
                Err(e) => warn!(
                    start = highlight.start,
                    end = highlight.end,
                    "Skipping segment that failed to extract: {}",
                    e
                ),
            }
        }

        if segments.is_empty() {
            return Err(MediaError::NoSegmentsExtracted {
                attempted: usable.len(),
            });
        }

        let extracted = segments.len();
        let mut inputs = segments;
        inputs.push(source.to_path_buf());

        let joined = scratch.path().join("joined.mp4");
        let expected = self.expected_duration(&inputs).await;

        let concat_mode = match self
            .join(&inputs, &joined, ConcatMode::Copy, scratch.path(), expected)
            .await
        {
            Ok(()) => ConcatMode::Copy,
            Err(copy_err) => {
                warn!("Stream-copy concat unusable, re-encoding: {}", copy_err);
                let _ = tokio::fs::remove_file(&joined).await;
                self.join(&inputs, &joined, ConcatMode::Reencode, scratch.path(), expected)
                    .await
                    .map_err(|reencode_err| MediaError::ConcatFailed {
                        copy: copy_err.to_string(),
                        reencode: reencode_err.to_string(),
                    })?;
                ConcatMode::Reencode
            }
        };

        move_into_place(&joined, output).await?;

        if let Err(e) = scratch.close() {
            warn!("Failed to remove scratch directory: {}", e);
        }

        info!(
            output = %output.display(),
            segments = extracted,
            mode = %concat_mode,
            "Highlight reel assembled"
        );

        Ok(AssemblyReport {
            segments_extracted: extracted,
            segments_skipped: usable.len() - extracted,
            concat_mode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{MediaProbe, StreamInfo, StreamKind};
    use std::sync::Mutex;

    /// Files hold their duration in seconds as text.
    #[derive(Default)]
    struct FakeTranscoder {
        fail_extract_at: Vec<u32>,
        fail_copy: bool,
        corrupt_copy: bool,
        fail_reencode: bool,
        calls: Mutex<Vec<String>>,
    }

    impl FakeTranscoder {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transcoder for FakeTranscoder {
        async fn extract(&self, _input: &Path, start: u32, end: u32, output: &Path) -> MediaResult<()> {
            self.calls.lock().unwrap().push(format!("extract {}-{}", start, end));
            if self.fail_extract_at.contains(&start) {
                return Err(MediaError::ffmpeg_failed("cut failed", None, Some(1)));
            }
            tokio::fs::write(output, (end - start).to_string()).await?;
            Ok(())
        }

        async fn concatenate(
            &self,
            inputs: &[PathBuf],
            output: &Path,
            mode: ConcatMode,
            _scratch: &Path,
        ) -> MediaResult<()> {
            self.calls.lock().unwrap().push(format!("concat {}", mode));
            let fail = match mode {
                ConcatMode::Copy => self.fail_copy,
                ConcatMode::Reencode => self.fail_reencode,
            };
            if fail {
                return Err(MediaError::ffmpeg_failed("join failed", None, Some(1)));
            }
            let mut total = 0.0;
            for input in inputs {
                total += tokio::fs::read_to_string(input).await?.parse::<f64>().unwrap_or(0.0);
            }
            if mode == ConcatMode::Copy && self.corrupt_copy {
                total = 1.0;
            }
            tokio::fs::write(output, total.to_string()).await?;
            Ok(())
        }

        async fn probe(&self, path: &Path) -> MediaResult<MediaProbe> {
            let duration = tokio::fs::read_to_string(path).await?.parse::<f64>().unwrap_or(0.0);
            Ok(MediaProbe {
                duration,
                format_name: Some("mp4".into()),
                bit_rate: None,
                size: None,
                streams: vec![StreamInfo {
                    kind: StreamKind::Video,
                    codec: Some("h264".into()),
                    width: Some(1280),
                    height: Some(720),
                    fps: Some(30.0),
                    bit_rate: None,
                    channels: None,
                    sample_rate: None,
                }],
            })
        }
    }

    struct Fixture {
        _root: TempDir,
        source: PathBuf,
        output: PathBuf,
        work: PathBuf,
    }

    async fn fixture() -> Fixture {
        let root = TempDir::new().unwrap();
        let source = root.path().join("source.mp4");
        tokio::fs::write(&source, "60").await.unwrap();
        Fixture {
            source,
            output: root.path().join("processed").join("processed_job.mp4"),
            work: root.path().join("work"),
            _root: root,
        }
    }

    async fn work_dir_is_empty(work: &Path) -> bool {
        let mut entries = tokio::fs::read_dir(work).await.unwrap();
        entries.next_entry().await.unwrap().is_none()
    }

    #[tokio::test]
    async fn test_invalid_highlight_is_filtered() {
        let fx = fixture().await;
        let assembler = HighlightAssembler::new(FakeTranscoder::default(), &fx.work);
        let highlights = vec![Highlight::new(0, 5, "a"), Highlight::new(10, 3, "b")];

        let report = assembler
            .process_highlights(&fx.source, &highlights, &fx.output)
            .await
            .unwrap();

        assert_eq!(report.segments_extracted, 1);
        assert_eq!(report.concat_mode, ConcatMode::Copy);
        let calls = assembler.transcoder.calls();
        assert_eq!(calls.iter().filter(|c| c.starts_with("extract")).count(), 1);
        assert_eq!(tokio::fs::read_to_string(&fx.output).await.unwrap(), "65");
        assert!(work_dir_is_empty(&fx.work).await);
    }

    #[tokio::test]
    async fn test_all_extractions_failing_leaves_no_files() {
        let fx = fixture().await;
        let transcoder = FakeTranscoder {
            fail_extract_at: vec![0, 20],
            ..Default::default()
        };
        let assembler = HighlightAssembler::new(transcoder, &fx.work);
        let highlights = vec![Highlight::new(0, 5, ""), Highlight::new(20, 30, "")];

        let err = assembler
            .process_highlights(&fx.source, &highlights, &fx.output)
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::NoSegmentsExtracted { attempted: 2 }));
        assert!(!fx.output.exists());
        assert!(work_dir_is_empty(&fx.work).await);
    }

    #[tokio::test]
    async fn test_no_usable_highlights_fails_without_cutting() {
        let fx = fixture().await;
        let assembler = HighlightAssembler::new(FakeTranscoder::default(), &fx.work);

        let err = assembler
            .process_highlights(&fx.source, &[Highlight::new(9, 9, "")], &fx.output)
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::NoUsableHighlights));
        assert!(assembler.transcoder.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_extraction_is_skipped() {
        let fx = fixture().await;
        let transcoder = FakeTranscoder {
            fail_extract_at: vec![30],
            ..Default::default()
        };
        let assembler = HighlightAssembler::new(transcoder, &fx.work);
        let highlights = vec![
            Highlight::new(30, 40, ""),
            Highlight::new(0, 10, ""),
            Highlight::new(5, 8, ""),
        ];

        let report = assembler
            .process_highlights(&fx.source, &highlights, &fx.output)
            .await
            .unwrap();

        assert_eq!(report.segments_extracted, 2);
        assert_eq!(report.segments_skipped, 1);
        assert_eq!(tokio::fs::read_to_string(&fx.output).await.unwrap(), "73");
    }

    #[tokio::test]
    async fn test_copy_failure_falls_back_to_reencode() {
        let fx = fixture().await;
        let transcoder = FakeTranscoder {
            fail_copy: true,
            ..Default::default()
        };
        let assembler = HighlightAssembler::new(transcoder, &fx.work);

        let report = assembler
            .process_highlights(&fx.source, &[Highlight::new(0, 5, "")], &fx.output)
            .await
            .unwrap();

        assert_eq!(report.concat_mode, ConcatMode::Reencode);
        let calls = assembler.transcoder.calls();
        assert_eq!(calls, vec!["extract 0-5", "concat copy", "concat reencode"]);
    }

    #[tokio::test]
    async fn test_truncated_copy_output_falls_back_to_reencode() {
        let fx = fixture().await;
        let transcoder = FakeTranscoder {
            corrupt_copy: true,
            ..Default::default()
        };
        let assembler = HighlightAssembler::new(transcoder, &fx.work);

        let report = assembler
            .process_highlights(&fx.source, &[Highlight::new(0, 5, "")], &fx.output)
            .await
            .unwrap();

        assert_eq!(report.concat_mode, ConcatMode::Reencode);
        assert_eq!(tokio::fs::read_to_string(&fx.output).await.unwrap(), "65");
    }

    #[tokio::test]
    async fn test_both_joins_failing_is_an_error_without_output() {
        let fx = fixture().await;
        let transcoder = FakeTranscoder {
            fail_copy: true,
            fail_reencode: true,
            ..Default::default()
        };
        let assembler = HighlightAssembler::new(transcoder, &fx.work);

        let err = assembler
            .process_highlights(&fx.source, &[Highlight::new(0, 5, "")], &fx.output)
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::ConcatFailed { .. }));
        assert!(!fx.output.exists());
        assert!(work_dir_is_empty(&fx.work).await);
    }
}
