//! Task spawning seam.
//!
//! Stages run as detached tasks. The engine only needs somewhere to put
//! them, so tests can hold tasks back and run them by hand.

use futures::future::BoxFuture;
use tracing::Instrument;

/// Runs engine stage tasks to completion in the background.
pub trait TaskSpawner: Send + Sync {
    fn spawn(&self, task: BoxFuture<'static, ()>);
}

/// Spawns onto the ambient tokio runtime.
#[derive(Debug, Clone, Default)]
pub struct TokioSpawner;

impl TaskSpawner for TokioSpawner {
    fn spawn(&self, task: BoxFuture<'static, ()>) {
        tokio::spawn(task.in_current_span());
    }
}
