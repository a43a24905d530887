//! Per-job fan-out of live events to observers.
//!
//! Each observer is a bounded channel. Delivery never waits: a full or
//! closed channel removes that observer and leaves the others untouched.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::debug;

use reel_models::{JobId, WsMessage};

use crate::metrics;

/// Identifies one observer within the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer-{}", self.0)
    }
}

/// Why an event could not be handed to an observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("observer queue is full")]
    Full,
    #[error("observer has disconnected")]
    Closed,
}

impl<T> From<TrySendError<T>> for DeliveryError {
    fn from(err: TrySendError<T>) -> Self {
        match err {
            TrySendError::Full(_) => DeliveryError::Full,
            TrySendError::Closed(_) => DeliveryError::Closed,
        }
    }
}

type ObserverSet = HashMap<ObserverId, mpsc::Sender<WsMessage>>;

/// Observer sets keyed by job.
#[derive(Default)]
pub struct EventHub {
    jobs: RwLock<HashMap<JobId, Arc<Mutex<ObserverSet>>>>,
    next_id: AtomicU64,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    async fn set_for(&self, job_id: &JobId) -> Option<Arc<Mutex<ObserverSet>>> {
        self.jobs.read().await.get(job_id).cloned()
    }

    async fn set_or_create(&self, job_id: &JobId) -> Arc<Mutex<ObserverSet>> {
        if let Some(set) = self.set_for(job_id).await {
            return set;
        }
        self.jobs
            .write()
            .await
            .entry(job_id.clone())
            .or_default()
            .clone()
    }

    /// Add an observer, handing it `initial` before any later broadcast.
    ///
    /// When `initial` cannot be delivered the observer is not added.
    pub async fn subscribe(
        &self,
        job_id: &JobId,
        observer: mpsc::Sender<WsMessage>,
        initial: Option<WsMessage>,
    ) -> Result<ObserverId, DeliveryError> {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let set = self.set_or_create(job_id).await;
        let mut observers = set.lock().await;

        if let Some(message) = initial {
            observer.try_send(message)?;
        }
        observers.insert(id, observer);
        metrics::record_observer_change(1.0);

        debug!(job_id = %job_id, observer = %id, total = observers.len(), "Observer subscribed");
        Ok(id)
    }

    /// Remove an observer. Unknown ids are ignored.
    pub async fn unsubscribe(&self, job_id: &JobId, observer: ObserverId) -> bool {
        let Some(set) = self.set_for(job_id).await else {
            return false;
        };
        let removed = set.lock().await.remove(&observer).is_some();
        if removed {
            metrics::record_observer_change(-1.0);
            debug!(job_id = %job_id, observer = %observer, "Observer unsubscribed");
        }
        removed
    }

    /// Deliver `message` to every observer of `job_id`; returns how many took it.
    pub async fn broadcast(&self, job_id: &JobId, message: &WsMessage) -> usize {
        let Some(set) = self.set_for(job_id).await else {
            return 0;
        };
        let mut observers = set.lock().await;

        let mut failed = Vec::new();
        for (id, sender) in observers.iter() {
            if let Err(e) = sender.try_send(message.clone()) {
                failed.push((*id, DeliveryError::from(e)));
            }
        }

        for (id, reason) in &failed {
            observers.remove(id);
            metrics::record_observer_change(-1.0);
            debug!(job_id = %job_id, observer = %id, "Dropping observer: {}", reason);
        }

        observers.len()
    }

    /// Number of live observers of a job.
    pub async fn observer_count(&self, job_id: &JobId) -> usize {
        match self.set_for(job_id).await {
            Some(set) => set.lock().await.len(),
            None => 0,
        }
    }

    /// Drop every observer of a job.
    pub async fn remove_job(&self, job_id: &JobId) {
        let removed = self.jobs.write().await.remove(job_id);
        if let Some(set) = removed {
            let count = set.lock().await.len();
            if count > 0 {
                metrics::record_observer_change(-(count as f64));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> JobId {
        JobId::from_string("job")
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_observer_in_order() {
        let hub = EventHub::new();
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        hub.subscribe(&job(), tx1, None).await.unwrap();
        hub.subscribe(&job(), tx2, None).await.unwrap();

        assert_eq!(hub.broadcast(&job(), &WsMessage::info("one")).await, 2);
        assert_eq!(hub.broadcast(&job(), &WsMessage::info("two")).await, 2);

        for rx in [&mut rx1, &mut rx2] {
            for expected in ["one", "two"] {
                match rx.recv().await {
                    Some(WsMessage::Log { message, .. }) => assert_eq!(message, expected),
                    other => panic!("unexpected message: {:?}", other),
                }
            }
        }
    }

    #[tokio::test]
    async fn test_initial_message_precedes_broadcasts() {
        let hub = EventHub::new();
        let (tx, mut rx) = mpsc::channel(8);
        hub.subscribe(&job(), tx, Some(WsMessage::timeline(Vec::new())))
            .await
            .unwrap();
        hub.broadcast(&job(), &WsMessage::info("later")).await;

        assert!(matches!(rx.recv().await, Some(WsMessage::Timeline { .. })));
        assert!(matches!(rx.recv().await, Some(WsMessage::Log { .. })));
    }

    #[tokio::test]
    async fn test_closed_observer_is_removed_without_affecting_others() {
        let hub = EventHub::new();
        let (tx_gone, rx_gone) = mpsc::channel(8);
        let (tx_live, mut rx_live) = mpsc::channel(8);
        hub.subscribe(&job(), tx_gone, None).await.unwrap();
        hub.subscribe(&job(), tx_live, None).await.unwrap();
        drop(rx_gone);

        assert_eq!(hub.broadcast(&job(), &WsMessage::info("hi")).await, 1);
        assert_eq!(hub.observer_count(&job()).await, 1);
        assert!(rx_live.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_full_observer_is_removed() {
        let hub = EventHub::new();
        let (tx, _rx) = mpsc::channel(1);
        hub.subscribe(&job(), tx, None).await.unwrap();

        assert_eq!(hub.broadcast(&job(), &WsMessage::info("fits")).await, 1);
        assert_eq!(hub.broadcast(&job(), &WsMessage::info("overflows")).await, 0);
        assert_eq!(hub.observer_count(&job()).await, 0);
    }

    #[tokio::test]
    async fn test_jobs_are_isolated_and_unsubscribe_works() {
        let hub = EventHub::new();
        let other = JobId::from_string("other");
        let (tx, mut rx) = mpsc::channel(8);
        let id = hub.subscribe(&job(), tx, None).await.unwrap();

        assert_eq!(hub.broadcast(&other, &WsMessage::info("elsewhere")).await, 0);
        assert!(rx.try_recv().is_err());

        assert!(hub.unsubscribe(&job(), id).await);
        assert!(!hub.unsubscribe(&job(), id).await);
        assert_eq!(hub.broadcast(&job(), &WsMessage::info("nobody")).await, 0);
    }

    #[tokio::test]
    async fn test_closed_observer_with_initial_message_is_rejected() {
        let hub = EventHub::new();
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let result = hub
            .subscribe(&job(), tx, Some(WsMessage::timeline(Vec::new())))
            .await;
        assert_eq!(result, Err(DeliveryError::Closed));
        assert_eq!(hub.observer_count(&job()).await, 0);
    }
}
