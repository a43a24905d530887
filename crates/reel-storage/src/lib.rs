//! Local storage for uploaded videos and produced reels.
//!
//! This crate provides:
//! - Saving uploads as `{video_id}_{filename}`
//! - Listing, finding and deleting source videos
//! - Output paths and public URLs for processed reels
//! - Listing and deleting processed reels

pub mod config;
pub mod error;
pub mod local;

pub use config::StorageConfig;
pub use error::{StorageError, StorageResult};
pub use local::{sanitize_filename, LocalStorage, ProcessedFile, StoredVideo};
