//! In-memory job registry.
//!
//! The outer map only guards membership. Each job has its own mutex so
//! stages of different jobs never contend.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use reel_models::{Job, JobId, VideoId};

/// A job plus the engine-private scheduling flag.
#[derive(Debug)]
pub struct JobRecord {
    pub job: Job,
    /// Set while a stage is scheduled or running for this job
    pub busy: bool,
    /// Set once the job has left the store; a running stage discards its result
    pub removed: bool,
}

impl JobRecord {
    pub fn new(job: Job) -> Self {
        Self {
            job,
            busy: false,
            removed: false,
        }
    }
}

pub type SharedRecord = Arc<Mutex<JobRecord>>;

struct JobSlot {
    video_id: VideoId,
    record: SharedRecord,
}

#[derive(Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, JobSlot>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job and return its shared record.
    pub async fn insert(&self, job: Job) -> SharedRecord {
        let id = job.id.clone();
        let video_id = job.video_id.clone();
        let record = Arc::new(Mutex::new(JobRecord::new(job)));
        self.jobs.write().await.insert(
            id,
            JobSlot {
                video_id,
                record: record.clone(),
            },
        );
        record
    }

    pub async fn get(&self, job_id: &JobId) -> Option<SharedRecord> {
        self.jobs.read().await.get(job_id).map(|slot| slot.record.clone())
    }

    /// Copy of the current job state.
    pub async fn snapshot(&self, job_id: &JobId) -> Option<Job> {
        let record = self.get(job_id).await?;
        let guard = record.lock().await;
        Some(guard.job.clone())
    }

    /// Remove every job submitted for `video_id`, returning their records.
    pub async fn remove_by_video(&self, video_id: &VideoId) -> Vec<(JobId, SharedRecord)> {
        let mut jobs = self.jobs.write().await;
        let ids: Vec<JobId> = jobs
            .iter()
            .filter(|(_, slot)| &slot.video_id == video_id)
            .map(|(id, _)| id.clone())
            .collect();
        ids.into_iter()
            .filter_map(|id| jobs.remove(&id).map(|slot| (id, slot.record)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_models::JobStatus;

    #[tokio::test]
    async fn test_insert_get_snapshot() {
        let store = JobStore::new();
        let job = Job::new(VideoId::from("vid"));
        let id = job.id.clone();
        let record = store.insert(job).await;

        record.lock().await.job.fail("boom");

        let snapshot = store.snapshot(&id).await.unwrap();
        assert_eq!(snapshot.status, JobStatus::Failed);
        assert!(store.get(&JobId::from_string("missing")).await.is_none());
    }

    #[tokio::test]
    async fn test_remove_by_video() {
        let store = JobStore::new();
        let a = store.insert(Job::new(VideoId::from("a"))).await;
        store.insert(Job::new(VideoId::from("a"))).await;
        store.insert(Job::new(VideoId::from("b"))).await;
        let a_id = a.lock().await.job.id.clone();

        let removed = store.remove_by_video(&VideoId::from("a")).await;
        assert_eq!(removed.len(), 2);
        assert!(removed.iter().any(|(id, _)| id == &a_id));
        assert!(store.get(&a_id).await.is_none());
        assert!(store.remove_by_video(&VideoId::from("a")).await.is_empty());
        assert_eq!(store.remove_by_video(&VideoId::from("b")).await.len(), 1);
    }
}
