//! Filesystem helpers for publishing finished outputs.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::MediaResult;

/// Move a finished file to `dst` so that `dst` is either absent or complete.
///
/// A plain rename is tried first. Across filesystems (EXDEV) the file is
/// copied to a hidden sibling of `dst` and renamed over it.
pub async fn move_into_place(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device_error(&e) => {
            debug!(
                "Cross-device rename, copying instead: {} -> {}",
                src.display(),
                dst.display()
            );
            copy_then_rename(src, dst).await
        }
        Err(e) => Err(e.into()),
    }
}

fn is_cross_device_error(e: &std::io::Error) -> bool {
    // EXDEV on Linux and macOS
    e.raw_os_error() == Some(18)
}

fn staging_path(dst: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(dst.file_name().unwrap_or_default());
    name.push(".partial");
    dst.with_file_name(name)
}

async fn copy_then_rename(src: &Path, dst: &Path) -> MediaResult<()> {
    let staging = staging_path(dst);

    if let Err(e) = fs::copy(src, &staging).await {
        let _ = fs::remove_file(&staging).await;
        return Err(e.into());
    }

    if let Err(e) = fs::rename(&staging, dst).await {
        let _ = fs::remove_file(&staging).await;
        return Err(e.into());
    }

    if let Err(e) = fs::remove_file(src).await {
        warn!("Failed to remove {} after copy: {}", src.display(), e);
    }

    Ok(())
}
