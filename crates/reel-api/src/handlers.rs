//! Request handlers.

pub mod health;
pub mod jobs;
pub mod processed;
pub mod videos;

pub use health::*;
pub use jobs::*;
pub use processed::*;
pub use videos::*;
