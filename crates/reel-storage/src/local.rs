//! Directory-backed store for sources and outputs.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

use reel_models::{JobId, VideoId};

use crate::config::StorageConfig;
use crate::error::{StorageError, StorageResult};

/// An uploaded source video on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredVideo {
    pub id: VideoId,
    /// Name the file was uploaded with
    pub filename: String,
    pub path: PathBuf,
}

/// A produced reel on disk.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedFile {
    pub filename: String,
    /// Public URL
    pub path: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

/// Local filesystem storage.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    config: StorageConfig,
}

impl LocalStorage {
    /// Open the store, creating both directories.
    pub async fn open(config: StorageConfig) -> StorageResult<Self> {
        fs::create_dir_all(&config.upload_dir).await?;
        fs::create_dir_all(&config.processed_dir).await?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn processed_dir(&self) -> &Path {
        &self.config.processed_dir
    }

    /// Store an upload read from `reader` under a fresh video id.
    pub async fn save_upload<R>(&self, filename: &str, reader: &mut R) -> StorageResult<StoredVideo>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let filename = sanitize_filename(filename);
        let id = VideoId::new();
        let path = self.config.upload_dir.join(format!("{}_{}", id, filename));

        let file = fs::File::create(&path).await?;
        let mut writer = BufWriter::new(file);

        let written = match tokio::io::copy(reader, &mut writer).await {
            Ok(n) => n,
            Err(e) => {
                drop(writer);
                let _ = fs::remove_file(&path).await;
                return Err(StorageError::upload_failed(e.to_string()));
            }
        };
        writer.flush().await?;

        info!(video_id = %id, bytes = written, "Stored upload {}", filename);

        Ok(StoredVideo { id, filename, path })
    }

    /// All uploaded videos, newest file name first.
    pub async fn list_uploads(&self) -> StorageResult<Vec<StoredVideo>> {
        let mut videos = Vec::new();
        let mut entries = fs::read_dir(&self.config.upload_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some((id, filename)) = split_upload_name(&name) {
                videos.push(StoredVideo {
                    id: VideoId::from(id),
                    filename: filename.to_string(),
                    path: entry.path(),
                });
            }
        }
        videos.sort_by(|a, b| a.filename.cmp(&b.filename).then(a.id.as_str().cmp(b.id.as_str())));
        Ok(videos)
    }

    /// Find an uploaded video by id.
    pub async fn find_upload(&self, id: &VideoId) -> StorageResult<Option<StoredVideo>> {
        let mut entries = fs::read_dir(&self.config.upload_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some((stored_id, filename)) = split_upload_name(&name) else {
                continue;
            };
            if stored_id == id.as_str() {
                return Ok(Some(StoredVideo {
                    id: id.clone(),
                    filename: filename.to_string(),
                    path: entry.path(),
                }));
            }
        }
        Ok(None)
    }

    /// Delete an uploaded video.
    pub async fn delete_upload(&self, id: &VideoId) -> StorageResult<StoredVideo> {
        let video = self
            .find_upload(id)
            .await?
            .ok_or_else(|| StorageError::not_found(format!("video {}", id)))?;
        fs::remove_file(&video.path).await?;
        info!(video_id = %id, "Deleted upload");
        Ok(video)
    }

    /// Where the reel for `job_id` is written.
    pub fn output_path(&self, job_id: &JobId) -> PathBuf {
        self.config
            .processed_dir
            .join(format!("processed_{}.mp4", job_id))
    }

    /// Public URL of a file in the processed directory.
    pub fn public_url(&self, filename: &str) -> String {
        format!("{}/{}", self.config.static_url_prefix, filename)
    }

    /// Public URL of an output path returned by [`Self::output_path`].
    pub fn output_url(&self, output: &Path) -> String {
        let filename = output
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.public_url(&filename)
    }

    /// All produced reels, newest first.
    pub async fn list_processed(&self) -> StorageResult<Vec<ProcessedFile>> {
        let mut files = Vec::new();
        let mut entries = fs::read_dir(&self.config.processed_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            // Hidden names are partial copies still being moved into place
            if name.starts_with('.') || !name.ends_with(".mp4") {
                continue;
            }
            let meta = match entry.metadata().await {
                Ok(meta) if meta.is_file() => meta,
                Ok(_) => continue,
                Err(e) => {
                    warn!("Skipping unreadable output {}: {}", name, e);
                    continue;
                }
            };
            let created_at = meta
                .created()
                .or_else(|_| meta.modified())
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            files.push(ProcessedFile {
                path: self.public_url(&name),
                filename: name,
                size: meta.len(),
                created_at,
            });
        }
        files.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(files)
    }

    /// Delete a produced reel by file name.
    pub async fn delete_processed(&self, filename: &str) -> StorageResult<()> {
        if !is_plain_filename(filename) {
            return Err(StorageError::invalid_name(filename));
        }
        let path = self.config.processed_dir.join(filename);
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Deleted output {}", filename);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::not_found(filename.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Split `{video_id}_{filename}`.
fn split_upload_name(name: &str) -> Option<(&str, &str)> {
    let (id, filename) = name.split_once('_')?;
    if id.is_empty() || filename.is_empty() {
        return None;
    }
    Some((id, filename))
}

fn is_plain_filename(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains("..")
}

/// Reduce an uploaded file name to a safe single path component.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "video.mp4".to_string()
    } else {
        cleaned.to_string()
    }
}
