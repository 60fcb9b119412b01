//! # Local Store
//!
//! The backup tree on disk, seen through the host's [`FileSystemAccess`].
//!
//! A destination counts as backed up only when it is a regular file with at
//! least one byte. Everything else found at a destination path (typically a
//! zero-byte leftover from an interrupted copy) is invalid and gets replaced.

use bridge_traits::{BridgeError, DownloadBody, FileSystemAccess, WriteTransaction};
use core_runtime::logging::strip_path;
use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{BackupError, Result};
use crate::retry::is_fatal_local;

/// Local side of a backup.
#[derive(Clone)]
pub struct LocalStore {
    fs: Arc<dyn FileSystemAccess>,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore").finish_non_exhaustive()
    }
}

impl LocalStore {
    pub fn new(fs: Arc<dyn FileSystemAccess>) -> Self {
        Self { fs }
    }

    /// Create `path` and any missing ancestors.
    pub async fn ensure_dir(&self, path: &Path) -> Result<()> {
        self.fs
            .create_dir_all(path)
            .await
            .map_err(|e| local_error(path, e))
    }

    pub async fn exists(&self, path: &Path) -> Result<bool> {
        self.fs.exists(path).await.map_err(|e| local_error(path, e))
    }

    /// Whether `path` holds a non-empty regular file.
    pub async fn is_valid(&self, path: &Path) -> Result<bool> {
        if !self.exists(path).await? {
            return Ok(false);
        }

        let metadata = self
            .fs
            .metadata(path)
            .await
            .map_err(|e| local_error(path, e))?;

        Ok(!metadata.is_directory && metadata.size > 0)
    }

    /// Delete whatever sits at `path` if it is not a valid file.
    ///
    /// Returns `true` when something was removed. Directories are never
    /// removed; one at a file's destination is reported as unwritable.
    pub async fn remove_if_invalid(&self, path: &Path) -> Result<bool> {
        if !self.exists(path).await? {
            return Ok(false);
        }

        let metadata = self
            .fs
            .metadata(path)
            .await
            .map_err(|e| local_error(path, e))?;

        if metadata.is_directory {
            return Err(BackupError::DestinationUnwritable {
                path: path.to_path_buf(),
                reason: "a directory occupies the destination".to_string(),
            });
        }
        if metadata.size > 0 {
            return Ok(false);
        }

        self.fs
            .delete_file(path)
            .await
            .map_err(|e| local_error(path, e))?;
        let shown = path.to_string_lossy();
        warn!(file = strip_path(&shown), "Removed empty file left by an earlier run");
        Ok(true)
    }

    /// Write a downloaded body to `path`.
    ///
    /// Data goes through a write transaction: on any failure, including an
    /// empty body or a length other than `expected_len`, the transaction is
    /// rolled back and `path` is left as it was. Returns the number of bytes
    /// written.
    pub async fn write_stream(
        &self,
        path: &Path,
        body: DownloadBody,
        expected_len: Option<u64>,
    ) -> Result<u64> {
        let mut tx = self
            .fs
            .begin_write(path)
            .await
            .map_err(|e| local_error(path, e))?;

        let copied = match copy_body(tx.as_mut(), path, body).await {
            Ok(0) => Err(BackupError::EmptyDownload(path.display().to_string())),
            Ok(len) if expected_len.is_some_and(|expected| expected != len) => {
                let shown = path.to_string_lossy();
                warn!(
                    file = strip_path(&shown),
                    expected = expected_len,
                    bytes = len,
                    "Size mismatch, download discarded"
                );
                Err(BackupError::CorruptLocalFile(path.to_path_buf()))
            }
            other => other,
        };

        match copied {
            Ok(_) => {
                let written = tx.commit().await.map_err(|e| local_error(path, e))?;
                debug!(path = ?path, bytes = written, "Committed download");
                Ok(written)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    let shown = path.to_string_lossy();
                    warn!(file = strip_path(&shown), error = %rollback, "Failed to discard partial download");
                }
                Err(e)
            }
        }
    }
}

async fn copy_body(tx: &mut dyn WriteTransaction, path: &Path, body: DownloadBody) -> Result<u64> {
    let mut stream = body.into_stream();
    let mut copied = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(BackupError::Remote)?;
        if chunk.is_empty() {
            continue;
        }
        tx.write_chunk(&chunk)
            .await
            .map_err(|e| local_error(path, e))?;
        copied += chunk.len() as u64;
    }

    Ok(copied)
}

/// Map a file system failure, promoting "cannot write here at all" errors.
pub(crate) fn local_error(path: &Path, source: BridgeError) -> BackupError {
    if is_fatal_local(&source) {
        BackupError::DestinationUnwritable {
            path: path.to_path_buf(),
            reason: source.to_string(),
        }
    } else {
        BackupError::LocalIo {
            path: path.to_path_buf(),
            source,
        }
    }
}
