//! Job orchestration engine.
//!
//! Owns every job, drives the analyze and process stages as background
//! tasks and narrates each transition to the job's observers.
//!
//! Lock order is job record, then observer set. Collaborators are never
//! called while a job record is locked.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::{mpsc, MutexGuard, Semaphore};
use tracing::{debug, info, warn, Instrument};

use reel_ai::HighlightAnalyzer;
use reel_media::{AssemblyReport, MediaAssembler};
use reel_models::timeline::events;
use reel_models::{Highlight, Job, JobId, TimelineStatus, VideoId, WsMessage};
use reel_storage::{LocalStorage, StoredVideo};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::executor::TaskSpawner;
use crate::hub::{EventHub, ObserverId};
use crate::logging::JobLogger;
use crate::metrics;
use crate::store::{JobRecord, JobStore, SharedRecord};

/// Which stages a scheduled task runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StagePlan {
    Pipeline,
    AnalysisOnly,
    ProcessingOnly,
}

impl StagePlan {
    fn as_str(&self) -> &'static str {
        match self {
            StagePlan::Pipeline => "pipeline",
            StagePlan::AnalysisOnly => "analyze",
            StagePlan::ProcessingOnly => "process",
        }
    }
}

struct Inner {
    config: EngineConfig,
    store: JobStore,
    hub: EventHub,
    storage: LocalStorage,
    analyzer: Arc<dyn HighlightAnalyzer>,
    assembler: Arc<dyn MediaAssembler>,
    spawner: Arc<dyn TaskSpawner>,
    stage_permits: Arc<Semaphore>,
}

/// Cheap to clone; all clones share one job table and one hub.
#[derive(Clone)]
pub struct JobEngine {
    inner: Arc<Inner>,
}

impl JobEngine {
    pub fn new(
        config: EngineConfig,
        storage: LocalStorage,
        analyzer: Arc<dyn HighlightAnalyzer>,
        assembler: Arc<dyn MediaAssembler>,
        spawner: Arc<dyn TaskSpawner>,
    ) -> Self {
        let stage_permits = Arc::new(Semaphore::new(config.max_concurrent_stages.max(1)));
        Self {
            inner: Arc::new(Inner {
                config,
                store: JobStore::new(),
                hub: EventHub::new(),
                storage,
                analyzer,
                assembler,
                spawner,
                stage_permits,
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn storage(&self) -> &LocalStorage {
        &self.inner.storage
    }

    // ------------------------------------------------------------------
    // Entry points
    // ------------------------------------------------------------------

    /// Create a job for `video_id` and schedule analysis followed by processing.
    pub async fn submit(&self, video_id: VideoId) -> EngineResult<Job> {
        self.submit_new(video_id, StagePlan::Pipeline).await
    }

    /// Create a job for `video_id` and schedule analysis only.
    ///
    /// On success the job returns to `Queued` holding its highlights.
    pub async fn submit_analysis(&self, video_id: VideoId) -> EngineResult<Job> {
        self.submit_new(video_id, StagePlan::AnalysisOnly).await
    }

    /// Re-run the process stage of an existing job using its stored highlights.
    pub async fn submit_processing(&self, job_id: &JobId) -> EngineResult<Job> {
        let record = self.record(job_id).await?;
        let mut guard = record.lock().await;

        if guard.removed {
            return Err(EngineError::JobNotFound(job_id.clone()));
        }
        if guard.busy {
            return Err(EngineError::StageInProgress {
                job_id: job_id.clone(),
                status: guard.job.status,
            });
        }
        if !guard.job.has_usable_highlights() {
            return Err(EngineError::MissingHighlights(job_id.clone()));
        }
        let video_id = guard.job.video_id.clone();
        self.source(&video_id).await?;

        guard.job.requeue();
        guard.busy = true;
        self.publish_log(&guard.job, WsMessage::info("Re-running video processing"))
            .await;
        let snapshot = guard.job.clone();
        drop(guard);

        metrics::record_job_submitted(StagePlan::ProcessingOnly.as_str());
        info!(job_id = %job_id, "Processing re-run scheduled");
        self.schedule(record, job_id.clone(), StagePlan::ProcessingOnly);
        Ok(snapshot)
    }

    /// Create a job whose highlights are chosen by the caller and schedule processing.
    pub async fn submit_manual(
        &self,
        video_id: VideoId,
        highlights: Vec<Highlight>,
    ) -> EngineResult<Job> {
        if !highlights.iter().any(Highlight::is_usable) {
            return Err(EngineError::invalid_highlights(
                "at least one clip with start before end is required",
            ));
        }
        self.source(&video_id).await?;

        let mut job = Job::new(video_id);
        job.push_event(events::VIDEO_UPLOADED, TimelineStatus::Completed);
        job.set_highlights(highlights);
        job.push_event(events::MANUAL_CLIPS_SELECTED, TimelineStatus::Completed);

        let (record, snapshot) = self.register(job).await;
        metrics::record_job_submitted("manual");
        info!(job_id = %snapshot.id, clips = snapshot.highlights.len(), "Manual job submitted");
        self.schedule(record, snapshot.id.clone(), StagePlan::ProcessingOnly);
        Ok(snapshot)
    }

    /// Current state of a job.
    pub async fn get(&self, job_id: &JobId) -> EngineResult<Job> {
        self.inner
            .store
            .snapshot(job_id)
            .await
            .ok_or_else(|| EngineError::JobNotFound(job_id.clone()))
    }

    /// Whether a stage is scheduled or running for the job.
    pub async fn is_busy(&self, job_id: &JobId) -> EngineResult<bool> {
        let record = self.record(job_id).await?;
        let busy = record.lock().await.busy;
        Ok(busy)
    }

    /// Attach an observer. It first receives one timeline snapshot when the
    /// job already has history, then every later event until it detaches.
    pub async fn subscribe(
        &self,
        job_id: &JobId,
        observer: mpsc::Sender<WsMessage>,
    ) -> EngineResult<ObserverId> {
        let record = self.record(job_id).await?;
        let guard = record.lock().await;
        if guard.removed {
            return Err(EngineError::JobNotFound(job_id.clone()));
        }
        let initial = (!guard.job.timeline.is_empty())
            .then(|| WsMessage::timeline(guard.job.timeline.clone()));

        self.inner
            .hub
            .subscribe(job_id, observer, initial)
            .await
            .map_err(|_| EngineError::ObserverGone)
    }

    /// [`Self::subscribe`] with a fresh channel sized from the config.
    pub async fn subscribe_channel(
        &self,
        job_id: &JobId,
    ) -> EngineResult<(ObserverId, mpsc::Receiver<WsMessage>)> {
        let (tx, rx) = mpsc::channel(self.inner.config.observer_buffer.max(1));
        let id = self.subscribe(job_id, tx).await?;
        Ok((id, rx))
    }

    pub async fn unsubscribe(&self, job_id: &JobId, observer: ObserverId) -> bool {
        self.inner.hub.unsubscribe(job_id, observer).await
    }

    pub async fn observer_count(&self, job_id: &JobId) -> usize {
        self.inner.hub.observer_count(job_id).await
    }

    /// Drop every job submitted for a deleted source and their observers.
    ///
    /// A stage already running for one of them finishes its collaborator
    /// call and then discards the result.
    pub async fn forget_source(&self, video_id: &VideoId) -> usize {
        let removed = self.inner.store.remove_by_video(video_id).await;
        for (job_id, record) in &removed {
            // a stage still holding the record sees the flag once it relocks
            let mut guard = record.lock().await;
            guard.removed = true;
            self.inner.hub.remove_job(job_id).await;
        }
        if !removed.is_empty() {
            info!(video_id = %video_id, jobs = removed.len(), "Removed jobs for deleted source");
        }
        removed.len()
    }

    // ------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------

    async fn submit_new(&self, video_id: VideoId, plan: StagePlan) -> EngineResult<Job> {
        self.source(&video_id).await?;

        let mut job = Job::new(video_id);
        job.push_event(events::VIDEO_UPLOADED, TimelineStatus::Completed);

        let (record, snapshot) = self.register(job).await;
        metrics::record_job_submitted(plan.as_str());
        info!(job_id = %snapshot.id, video_id = %snapshot.video_id, plan = plan.as_str(), "Job submitted");
        self.schedule(record, snapshot.id.clone(), plan);
        Ok(snapshot)
    }

    /// Insert a job already marked busy so no re-run can race its first task.
    async fn register(&self, job: Job) -> (SharedRecord, Job) {
        let record = self.inner.store.insert(job).await;
        let snapshot = {
            let mut guard = record.lock().await;
            guard.busy = true;
            guard.job.clone()
        };
        (record, snapshot)
    }

    fn schedule(&self, record: SharedRecord, job_id: JobId, plan: StagePlan) {
        let engine = self.clone();
        let span = JobLogger::new(&job_id, plan.as_str()).create_span();
        let task = async move { engine.run(record, job_id, plan).await }.instrument(span);
        self.inner.spawner.spawn(task.boxed());
    }

    async fn run(self, record: SharedRecord, job_id: JobId, plan: StagePlan) {
        let _permit = self.inner.stage_permits.clone().acquire_owned().await.ok();

        let mut guard = match plan {
            StagePlan::Pipeline => {
                let (analyzed, guard) = self.analyze_stage(&record, &job_id).await;
                if analyzed {
                    drop(guard);
                    self.process_stage(&record, &job_id).await.1
                } else {
                    guard
                }
            }
            StagePlan::AnalysisOnly => {
                let (analyzed, mut guard) = self.analyze_stage(&record, &job_id).await;
                if analyzed {
                    guard.job.requeue();
                    self.publish_log(&guard.job, WsMessage::info("Highlights ready for processing"))
                        .await;
                }
                guard
            }
            StagePlan::ProcessingOnly => self.process_stage(&record, &job_id).await.1,
        };

        // released under the same lock as the final transition
        guard.busy = false;
        drop(guard);
        debug!(job_id = %job_id, plan = plan.as_str(), "Stage task finished");
    }

    // ------------------------------------------------------------------
    // Stages
    // ------------------------------------------------------------------

    /// Returns whether analysis produced highlights, still holding the
    /// record lock taken for the final transition.
    async fn analyze_stage<'a>(
        &self,
        record: &'a SharedRecord,
        job_id: &JobId,
    ) -> (bool, MutexGuard<'a, JobRecord>) {
        let logger = JobLogger::new(job_id, "analyze");
        let started = Instant::now();

        let video_id = {
            let mut guard = record.lock().await;
            if guard.removed {
                return (false, guard);
            }
            guard.job.start_analysis();
            guard
                .job
                .push_event(events::ANALYSIS_STARTED, TimelineStatus::InProgress);
            self.publish(&guard, WsMessage::info("Analyzing video for highlights..."))
                .await;
            guard.job.video_id.clone()
        };
        logger.log_start(&format!("analyzing source {}", video_id));

        let outcome = guarded("analysis", self.inner.config.analysis_timeout, async {
            let source = self.source(&video_id).await.map_err(|e| e.to_string())?;
            logger.log_progress(&format!("sending {} to the analyzer", source.filename));
            let highlights = self.inner.analyzer.analyze(&source.path).await;
            if highlights.is_empty() {
                return Err("No highlights found".to_string());
            }
            Ok(highlights)
        })
        .await;
        metrics::record_stage_duration("analyze", started.elapsed().as_secs_f64());

        let mut guard = record.lock().await;
        if guard.removed {
            debug!(job_id = %job_id, "Job removed during analysis, dropping result");
            return (false, guard);
        }
        let succeeded = match outcome {
            Ok(highlights) => {
                let count = highlights.len();
                guard.job.set_highlights(highlights);
                guard
                    .job
                    .push_event(events::ANALYSIS_COMPLETE, TimelineStatus::Completed);
                self.publish(&guard, WsMessage::success(format!("Found {} highlights", count)))
                    .await;
                logger.log_completion(&format!("{} highlights", count));
                true
            }
            Err(reason) => {
                guard.job.fail(reason.clone());
                guard
                    .job
                    .push_event(events::ANALYSIS_FAILED, TimelineStatus::Failed);
                self.publish(&guard, WsMessage::error(format!("Analysis failed: {}", reason)))
                    .await;
                metrics::record_job_failed("analyze");
                logger.log_error(&reason);
                false
            }
        };
        (succeeded, guard)
    }

    async fn process_stage<'a>(
        &self,
        record: &'a SharedRecord,
        job_id: &JobId,
    ) -> (bool, MutexGuard<'a, JobRecord>) {
        let logger = JobLogger::new(job_id, "process");
        let started = Instant::now();

        let (video_id, highlights) = {
            let mut guard = record.lock().await;
            if guard.removed {
                return (false, guard);
            }
            guard.job.start_processing();
            guard
                .job
                .push_event(events::PROCESSING_STARTED, TimelineStatus::InProgress);
            let message = format!("Cutting {} highlights into a reel...", guard.job.highlights.len());
            self.publish(&guard, WsMessage::info(message)).await;
            (guard.job.video_id.clone(), guard.job.highlights.clone())
        };
        logger.log_start(&format!("{} highlights", highlights.len()));

        let output = self.inner.storage.output_path(job_id);
        let outcome: Result<AssemblyReport, String> =
            guarded("processing", self.inner.config.processing_timeout, async {
                let source = self.source(&video_id).await.map_err(|e| e.to_string())?;
                logger.log_progress(&format!(
                    "cutting {} highlights from {}",
                    highlights.len(),
                    source.filename
                ));
                self.inner
                    .assembler
                    .process_highlights(&source.path, &highlights, &output)
                    .await
                    .map_err(|e| e.to_string())
            })
            .await;
        metrics::record_stage_duration("process", started.elapsed().as_secs_f64());

        let mut guard = record.lock().await;
        if guard.removed {
            if outcome.is_ok() {
                if let Err(e) = tokio::fs::remove_file(&output).await {
                    warn!(job_id = %job_id, "Failed to remove output of deleted job: {}", e);
                }
            }
            debug!(job_id = %job_id, "Job removed during processing, dropping result");
            return (false, guard);
        }
        let succeeded = match outcome {
            Ok(report) => {
                if report.segments_skipped > 0 {
                    let warning = format!(
                        "Skipped {} highlight(s) that could not be cut",
                        report.segments_skipped
                    );
                    logger.log_warning(&warning);
                    self.publish_log(&guard.job, WsMessage::warning(warning)).await;
                }
                let url = self.inner.storage.output_url(&output);
                guard.job.complete(url.clone());
                guard
                    .job
                    .push_event(events::PROCESSING_COMPLETE, TimelineStatus::Completed);
                self.publish(&guard, WsMessage::success(format!("Highlight reel ready: {}", url)))
                    .await;
                metrics::record_job_completed();
                logger.log_completion(&format!(
                    "{} segments joined with {}",
                    report.segments_extracted, report.concat_mode
                ));
                true
            }
            Err(reason) => {
                guard.job.fail(reason.clone());
                guard
                    .job
                    .push_event(events::PROCESSING_FAILED, TimelineStatus::Failed);
                self.publish(&guard, WsMessage::error(format!("Processing failed: {}", reason)))
                    .await;
                metrics::record_job_failed("process");
                logger.log_error(&reason);
                false
            }
        };
        (succeeded, guard)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    async fn record(&self, job_id: &JobId) -> EngineResult<SharedRecord> {
        self.inner
            .store
            .get(job_id)
            .await
            .ok_or_else(|| EngineError::JobNotFound(job_id.clone()))
    }

    async fn source(&self, video_id: &VideoId) -> EngineResult<StoredVideo> {
        self.inner
            .storage
            .find_upload(video_id)
            .await?
            .ok_or_else(|| EngineError::SourceNotFound(video_id.clone()))
    }

    /// Broadcast a log line followed by the full timeline.
    async fn publish(&self, record: &JobRecord, log: WsMessage) {
        self.publish_log(&record.job, log).await;
        self.inner
            .hub
            .broadcast(&record.job.id, &WsMessage::timeline(record.job.timeline.clone()))
            .await;
    }

    async fn publish_log(&self, job: &Job, log: WsMessage) {
        self.inner.hub.broadcast(&job.id, &log).await;
    }
}

/// Run one stage body, turning a timeout or panic into a failure reason.
async fn guarded<T, F>(stage: &str, limit: Duration, body: F) -> Result<T, String>
where
    F: Future<Output = Result<T, String>>,
{
    match tokio::time::timeout(limit, AssertUnwindSafe(body).catch_unwind()).await {
        Ok(Ok(result)) => result,
        Ok(Err(panic)) => Err(panic_message(panic)),
        Err(_) => Err(format!("{} timed out after {:?}", stage, limit)),
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("internal error: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("internal error: {}", s)
    } else {
        "internal error".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::future::BoxFuture;
    use reel_media::{ConcatMode, MediaError, MediaResult};
    use reel_models::JobStatus;
    use reel_storage::StorageConfig;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;
    use tokio::sync::mpsc::error::TryRecvError;
    use tokio::sync::Notify;
    use tokio_test::{assert_err, assert_ok};

    use crate::executor::TokioSpawner;

    #[derive(Clone, Copy)]
    enum Analysis {
        /// One highlight labelled with the source file name
        Found,
        Nothing,
        Panic,
        Hang,
    }

    struct FakeAnalyzer {
        behavior: Analysis,
        calls: AtomicUsize,
    }

    impl FakeAnalyzer {
        fn new(behavior: Analysis) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl HighlightAnalyzer for FakeAnalyzer {
        async fn analyze(&self, source: &Path) -> Vec<Highlight> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Analysis::Found => {
                    let name = source
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    vec![Highlight::new(0, 5, name)]
                }
                Analysis::Nothing => Vec::new(),
                Analysis::Panic => panic!("analyzer exploded"),
                Analysis::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Vec::new()
                }
            }
        }
    }

    /// Lets a test act while an assembly is in flight.
    #[derive(Default)]
    struct Gate {
        entered: Notify,
        release: Notify,
    }

    /// Fails the first `failures` calls, then writes a small output file.
    struct FakeAssembler {
        failures: usize,
        calls: AtomicUsize,
        gate: Option<Gate>,
    }

    impl FakeAssembler {
        fn new(failures: usize) -> Arc<Self> {
            Arc::new(Self {
                failures,
                calls: AtomicUsize::new(0),
                gate: None,
            })
        }

        /// Waits for the test to release it before writing the output.
        fn gated() -> Arc<Self> {
            Arc::new(Self {
                failures: 0,
                calls: AtomicUsize::new(0),
                gate: Some(Gate::default()),
            })
        }
    }

    #[async_trait]
    impl MediaAssembler for FakeAssembler {
        async fn process_highlights(
            &self,
            _source: &Path,
            highlights: &[Highlight],
            output: &Path,
        ) -> MediaResult<AssemblyReport> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.entered.notify_one();
                gate.release.notified().await;
            }
            if call < self.failures {
                return Err(MediaError::ConcatFailed {
                    copy: "copy failed".into(),
                    reencode: "reencode failed".into(),
                });
            }
            tokio::fs::write(output, b"reel").await?;
            let usable = highlights.iter().filter(|h| h.is_usable()).count();
            Ok(AssemblyReport {
                segments_extracted: usable,
                segments_skipped: 0,
                concat_mode: ConcatMode::Copy,
            })
        }
    }

    /// Holds stage tasks until the test runs them.
    #[derive(Default)]
    struct QueuedSpawner {
        tasks: StdMutex<Vec<BoxFuture<'static, ()>>>,
    }

    impl QueuedSpawner {
        async fn run_all(&self) {
            loop {
                let next = self.tasks.lock().unwrap().pop();
                match next {
                    Some(task) => task.await,
                    None => break,
                }
            }
        }
    }

    impl TaskSpawner for QueuedSpawner {
        fn spawn(&self, task: BoxFuture<'static, ()>) {
            self.tasks.lock().unwrap().push(task);
        }
    }

    struct Harness {
        _dir: TempDir,
        engine: JobEngine,
        spawner: Arc<QueuedSpawner>,
        analyzer: Arc<FakeAnalyzer>,
        assembler: Arc<FakeAssembler>,
    }

    async fn harness(analysis: Analysis, assembly_failures: usize) -> Harness {
        harness_with(analysis, FakeAssembler::new(assembly_failures), EngineConfig::default()).await
    }

    async fn harness_with(
        analysis: Analysis,
        assembler: Arc<FakeAssembler>,
        config: EngineConfig,
    ) -> Harness {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::open(StorageConfig::rooted(dir.path()))
            .await
            .unwrap();
        let spawner = Arc::new(QueuedSpawner::default());
        let analyzer = FakeAnalyzer::new(analysis);
        let config = EngineConfig {
            work_dir: dir.path().join("work"),
            ..config
        };
        let engine = JobEngine::new(
            config,
            storage,
            analyzer.clone(),
            assembler.clone(),
            spawner.clone(),
        );
        Harness {
            _dir: dir,
            engine,
            spawner,
            analyzer,
            assembler,
        }
    }

    async fn upload(engine: &JobEngine, name: &str) -> VideoId {
        engine
            .storage()
            .save_upload(name, &mut &b"video bytes"[..])
            .await
            .unwrap()
            .id
    }

    fn event_names(job: &Job) -> Vec<&str> {
        job.timeline.iter().map(|e| e.event.as_str()).collect()
    }

    fn drain(rx: &mut mpsc::Receiver<WsMessage>) -> Vec<WsMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    fn timeline_lengths(messages: &[WsMessage]) -> Vec<usize> {
        messages
            .iter()
            .filter_map(|m| match m {
                WsMessage::Timeline { timeline } => Some(timeline.len()),
                WsMessage::Log { .. } => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_pipeline_completes_with_output() {
        let h = harness(Analysis::Found, 0).await;
        let video = upload(&h.engine, "match.mp4").await;

        let job = h.engine.submit(video).await.unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(event_names(&job), vec![events::VIDEO_UPLOADED]);

        h.spawner.run_all().await;

        let job = h.engine.get(&job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(
            job.output_url.as_deref(),
            Some(format!("/static/processed_{}.mp4", job.id).as_str())
        );
        assert!(job.error.is_none());
        assert_eq!(job.highlights.len(), 1);
        assert_eq!(
            event_names(&job),
            vec![
                events::VIDEO_UPLOADED,
                events::ANALYSIS_STARTED,
                events::ANALYSIS_COMPLETE,
                events::PROCESSING_STARTED,
                events::PROCESSING_COMPLETE,
            ]
        );
        assert!(h.engine.storage().output_path(&job.id).exists());
        assert!(!h.engine.is_busy(&job.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_analysis_fails_without_processing() {
        let h = harness(Analysis::Nothing, 0).await;
        let video = upload(&h.engine, "quiet.mp4").await;

        let job = h.engine.submit(video).await.unwrap();
        h.spawner.run_all().await;

        let job = h.engine.get(&job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("No highlights found"));
        assert!(job.output_url.is_none());
        assert_eq!(job.timeline.last().unwrap().event, events::ANALYSIS_FAILED);
        assert_eq!(job.timeline.last().unwrap().status, TimelineStatus::Failed);
        assert_eq!(h.assembler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_processing_failure_sets_error_only() {
        let h = harness(Analysis::Found, 1).await;
        let video = upload(&h.engine, "clip.mp4").await;

        let job = h.engine.submit(video).await.unwrap();
        h.spawner.run_all().await;

        let job = h.engine.get(&job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.as_deref().unwrap().contains("Concatenation failed"));
        assert!(job.output_url.is_none());
        assert_eq!(job.timeline.last().unwrap().event, events::PROCESSING_FAILED);
    }

    #[tokio::test]
    async fn test_analyzer_panic_becomes_failure() {
        let h = harness(Analysis::Panic, 0).await;
        let video = upload(&h.engine, "boom.mp4").await;

        let job = h.engine.submit(video).await.unwrap();
        h.spawner.run_all().await;

        let job = h.engine.get(&job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.as_deref().unwrap().contains("analyzer exploded"));
        assert!(!h.engine.is_busy(&job.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_analysis_timeout_becomes_failure() {
        let config = EngineConfig {
            analysis_timeout: Duration::from_millis(50),
            ..EngineConfig::default()
        };
        let h = harness_with(Analysis::Hang, FakeAssembler::new(0), config).await;
        let video = upload(&h.engine, "slow.mp4").await;

        let job = h.engine.submit(video).await.unwrap();
        h.spawner.run_all().await;

        let job = h.engine.get(&job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("analysis timed out after 50ms"));
    }

    #[tokio::test]
    async fn test_analysis_only_returns_to_queued() {
        let h = harness(Analysis::Found, 0).await;
        let video = upload(&h.engine, "talk.mp4").await;

        let job = h.engine.submit_analysis(video).await.unwrap();
        h.spawner.run_all().await;

        let job = h.engine.get(&job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.highlights.len(), 1);
        assert!(job.error.is_none());
        assert_eq!(h.assembler.calls.load(Ordering::SeqCst), 0);

        h.engine.submit_processing(&job.id).await.unwrap();
        h.spawner.run_all().await;
        let job = h.engine.get(&job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(h.analyzer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_processing_rerun_recovers_failed_job() {
        let h = harness(Analysis::Found, 1).await;
        let video = upload(&h.engine, "game.mp4").await;

        let job = h.engine.submit(video).await.unwrap();
        h.spawner.run_all().await;
        assert_eq!(h.engine.get(&job.id).await.unwrap().status, JobStatus::Failed);

        let rerun = h.engine.submit_processing(&job.id).await.unwrap();
        assert_eq!(rerun.id, job.id);
        assert_eq!(rerun.status, JobStatus::Queued);
        assert!(rerun.error.is_none());

        h.spawner.run_all().await;

        let job = h.engine.get(&job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.error.is_none());
        assert!(job.output_url.is_some());
        assert_eq!(h.analyzer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            &event_names(&job)[5..],
            &[events::PROCESSING_STARTED, events::PROCESSING_COMPLETE]
        );
    }

    #[tokio::test]
    async fn test_processing_rerun_validation() {
        let h = harness(Analysis::Nothing, 0).await;
        let video = upload(&h.engine, "dull.mp4").await;

        let job = h.engine.submit(video).await.unwrap();
        // task not yet run: the job is still reserved
        let err = h.engine.submit_processing(&job.id).await.unwrap_err();
        assert!(matches!(err, EngineError::StageInProgress { .. }));

        h.spawner.run_all().await;
        let err = h.engine.submit_processing(&job.id).await.unwrap_err();
        assert!(matches!(err, EngineError::MissingHighlights(_)));

        let err = h
            .engine
            .submit_processing(&JobId::from_string("missing"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_manual_clips_skip_analysis() {
        let h = harness(Analysis::Found, 0).await;
        let video = upload(&h.engine, "manual.mp4").await;

        let err = h
            .engine
            .submit_manual(video.clone(), vec![Highlight::new(9, 3, "")])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidHighlights(_)));

        let job = h
            .engine
            .submit_manual(video, vec![Highlight::new(2, 8, "")])
            .await
            .unwrap();
        h.spawner.run_all().await;

        let job = h.engine.get(&job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(h.analyzer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            event_names(&job),
            vec![
                events::VIDEO_UPLOADED,
                events::MANUAL_CLIPS_SELECTED,
                events::PROCESSING_STARTED,
                events::PROCESSING_COMPLETE,
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_references_are_not_found() {
        let h = harness(Analysis::Found, 0).await;

        let err = h.engine.submit(VideoId::from("nope")).await.unwrap_err();
        assert!(matches!(err, EngineError::SourceNotFound(_)));

        let unknown = JobId::from_string("nope");
        assert!(h.engine.get(&unknown).await.unwrap_err().is_not_found());
        assert!(h.engine.subscribe_channel(&unknown).await.unwrap_err().is_not_found());
        assert!(h.spawner.tasks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_observer_sees_ordered_events_without_gaps() {
        let h = harness(Analysis::Found, 0).await;
        let video = upload(&h.engine, "live.mp4").await;

        let job = h.engine.submit(video).await.unwrap();
        let (_id, mut rx) = h.engine.subscribe_channel(&job.id).await.unwrap();
        h.spawner.run_all().await;

        let messages = drain(&mut rx);
        assert!(matches!(messages.first(), Some(WsMessage::Timeline { .. })));
        assert_eq!(timeline_lengths(&messages), vec![1, 2, 3, 4, 5]);
        assert!(messages
            .iter()
            .any(|m| matches!(m, WsMessage::Log { message, .. } if message.starts_with("Highlight reel ready"))));
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_one_snapshot() {
        let h = harness(Analysis::Found, 0).await;
        let video = upload(&h.engine, "done.mp4").await;

        let job = h.engine.submit(video).await.unwrap();
        h.spawner.run_all().await;

        let (_id, mut rx) = h.engine.subscribe_channel(&job.id).await.unwrap();
        match rx.try_recv() {
            Ok(WsMessage::Timeline { timeline }) => assert_eq!(timeline.len(), 5),
            other => panic!("expected timeline snapshot, got {:?}", other),
        }
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_slow_observer_is_dropped_others_continue() {
        let h = harness(Analysis::Found, 0).await;
        let video = upload(&h.engine, "fanout.mp4").await;
        let job = h.engine.submit(video).await.unwrap();

        // capacity one: the snapshot fills it, the next broadcast overflows
        let (slow_tx, _slow_rx) = mpsc::channel(1);
        h.engine.subscribe(&job.id, slow_tx).await.unwrap();
        let (gone_tx, gone_rx) = mpsc::channel(8);
        h.engine.subscribe(&job.id, gone_tx).await.unwrap();
        drop(gone_rx);
        let (_id, mut rx) = h.engine.subscribe_channel(&job.id).await.unwrap();
        assert_eq!(h.engine.observer_count(&job.id).await, 3);

        h.spawner.run_all().await;

        assert_eq!(h.engine.observer_count(&job.id).await, 1);
        assert_eq!(timeline_lengths(&drain(&mut rx)), vec![1, 2, 3, 4, 5]);
        assert_eq!(h.engine.get(&job.id).await.unwrap().status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_forget_source_drops_jobs() {
        let h = harness(Analysis::Found, 0).await;
        let video = upload(&h.engine, "gone.mp4").await;
        let job = h.engine.submit(video.clone()).await.unwrap();
        h.spawner.run_all().await;

        assert_eq!(h.engine.forget_source(&video).await, 1);
        assert!(h.engine.get(&job.id).await.is_err());
        assert_eq!(h.engine.observer_count(&job.id).await, 0);
    }

    #[tokio::test]
    async fn test_longer_id_does_not_alias_an_upload() {
        let h = harness(Analysis::Found, 0).await;
        let video = upload(&h.engine, "my_talk.mp4").await;

        let alias = VideoId::from(format!("{}_my", video));
        let err = assert_err!(h.engine.submit(alias).await);
        assert!(matches!(err, EngineError::SourceNotFound(_)));

        let job = assert_ok!(h.engine.submit(video.clone()).await);
        assert_eq!(h.engine.forget_source(&video).await, 1);
        assert_err!(h.engine.get(&job.id).await);
    }

    #[tokio::test]
    async fn test_job_removed_before_start_never_runs() {
        let h = harness(Analysis::Found, 0).await;
        let video = upload(&h.engine, "early.mp4").await;
        let job = assert_ok!(h.engine.submit(video.clone()).await);

        assert_eq!(h.engine.forget_source(&video).await, 1);
        h.spawner.run_all().await;

        assert_eq!(h.analyzer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.assembler.calls.load(Ordering::SeqCst), 0);
        assert!(!h.engine.storage().output_path(&job.id).exists());
        let err = assert_err!(h.engine.submit_processing(&job.id).await);
        assert!(matches!(err, EngineError::JobNotFound(_)));
    }

    #[tokio::test]
    async fn test_job_removed_mid_processing_leaves_no_output() {
        let h = harness_with(Analysis::Found, FakeAssembler::gated(), EngineConfig::default()).await;
        let video = upload(&h.engine, "dropped.mp4").await;
        let job = assert_ok!(h.engine.submit(video.clone()).await);
        let (_observer, mut rx) = assert_ok!(h.engine.subscribe_channel(&job.id).await);

        let spawner = h.spawner.clone();
        let stages = tokio::spawn(async move { spawner.run_all().await });
        let gate = h.assembler.gate.as_ref().unwrap();
        gate.entered.notified().await;

        assert_eq!(h.engine.forget_source(&video).await, 1);
        drain(&mut rx);
        gate.release.notify_one();
        stages.await.unwrap();

        assert!(!h.engine.storage().output_path(&job.id).exists());
        assert!(assert_ok!(h.engine.storage().list_processed().await).is_empty());
        let err = assert_err!(h.engine.subscribe_channel(&job.id).await);
        assert!(matches!(err, EngineError::JobNotFound(_)));
        assert_eq!(h.engine.observer_count(&job.id).await, 0);
        // the hub dropped the sender and nothing was published after removal
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Disconnected)));
    }

    #[tokio::test]
    async fn test_concurrent_jobs_stay_independent() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::open(StorageConfig::rooted(dir.path()))
            .await
            .unwrap();
        let engine = JobEngine::new(
            EngineConfig::default(),
            storage,
            FakeAnalyzer::new(Analysis::Found),
            FakeAssembler::new(0),
            Arc::new(TokioSpawner),
        );
        let first = upload(&engine, "first.mp4").await;
        let second = upload(&engine, "second.mp4").await;

        let (a, b) = tokio::join!(engine.submit(first), engine.submit(second));
        let (a, b) = (a.unwrap(), b.unwrap());

        for _ in 0..500 {
            let done = !engine.is_busy(&a.id).await.unwrap() && !engine.is_busy(&b.id).await.unwrap();
            if done {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        for (job, name) in [(a, "first.mp4"), (b, "second.mp4")] {
            let job = engine.get(&job.id).await.unwrap();
            assert_eq!(job.status, JobStatus::Completed);
            assert_eq!(job.timeline.len(), 5);
            assert!(job.highlights[0].description.ends_with(name));
            assert!(job.output_url.unwrap().contains(job.id.as_str()));
        }
    }
}
