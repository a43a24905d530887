//! Job orchestration for highlight reels.
//!
//! [`JobEngine`] owns every job, runs the analyze and process stages as
//! background tasks and fans progress out to observers via [`EventHub`].

pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod hub;
pub mod logging;
pub mod metrics;
pub mod store;

pub use config::EngineConfig;
pub use engine::JobEngine;
pub use error::{EngineError, EngineResult};
pub use executor::{TaskSpawner, TokioSpawner};
pub use hub::{DeliveryError, EventHub, ObserverId};
pub use logging::JobLogger;
pub use store::{JobRecord, JobStore};
