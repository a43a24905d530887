//! Engine metrics.

use metrics::{counter, gauge, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_SUBMITTED_TOTAL: &str = "reel_jobs_submitted_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "reel_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "reel_jobs_failed_total";
    pub const STAGE_DURATION_SECONDS: &str = "reel_stage_duration_seconds";
    pub const WS_OBSERVERS_ACTIVE: &str = "reel_ws_observers_active";
}

/// Record a job submission of the given kind.
pub fn record_job_submitted(kind: &str) {
    let labels = [("kind", kind.to_string())];
    counter!(names::JOBS_SUBMITTED_TOTAL, &labels).increment(1);
}

pub fn record_job_completed() {
    counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
}

/// Record a stage failure.
pub fn record_job_failed(stage: &str) {
    let labels = [("stage", stage.to_string())];
    counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
}

pub fn record_stage_duration(stage: &str, duration_secs: f64) {
    let labels = [("stage", stage.to_string())];
    histogram!(names::STAGE_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Adjust the live observer gauge by `delta`.
pub fn record_observer_change(delta: f64) {
    gauge!(names::WS_OBSERVERS_ACTIVE).increment(delta);
}
