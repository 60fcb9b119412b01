//! File System Access Implementation using Tokio

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{FileMetadata, FileSystemAccess, WriteTransaction},
};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Tokio-based file system implementation
///
/// Writes are staged next to their destination in a hidden
/// `.<filename>.part` file so the rename on commit stays on one file system.
#[derive(Debug, Clone, Default)]
pub struct TokioFileSystem;

impl TokioFileSystem {
    pub fn new() -> Self {
        Self
    }

    /// Convert std::io::Error to BridgeError
    fn map_io_error(e: std::io::Error) -> BridgeError {
        BridgeError::Io(e)
    }

    fn staging_path(path: &Path) -> Result<PathBuf> {
        let name = path.file_name().ok_or_else(|| {
            BridgeError::OperationFailed(format!("not a file path: {}", path.display()))
        })?;
        let mut staged = std::ffi::OsString::from(".");
        staged.push(name);
        staged.push(".part");
        Ok(path.with_file_name(staged))
    }
}

#[async_trait]
impl FileSystemAccess for TokioFileSystem {
    async fn exists(&self, path: &Path) -> Result<bool> {
        fs::try_exists(path).await.map_err(Self::map_io_error)
    }

    async fn metadata(&self, path: &Path) -> Result<FileMetadata> {
        let metadata = fs::metadata(path).await.map_err(Self::map_io_error)?;

        Ok(FileMetadata {
            size: metadata.len(),
            modified_at: metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64),
            is_directory: metadata.is_dir(),
        })
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).await.map_err(Self::map_io_error)?;
        debug!(path = ?path, "Created directory");
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).await.map_err(Self::map_io_error)?;
        debug!(path = ?path, "Deleted file");
        Ok(())
    }

    async fn begin_write(&self, path: &Path) -> Result<Box<dyn WriteTransaction>> {
        let staging = Self::staging_path(path)?;

        // A leftover from an interrupted run is never worth keeping.
        match fs::remove_file(&staging).await {
            Ok(()) => debug!(path = ?staging, "Removed stale staging file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(Self::map_io_error(e)),
        }

        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&staging)
            .await
            .map_err(Self::map_io_error)?;

        debug!(path = ?path, staging = ?staging, "Opened write transaction");
        Ok(Box::new(TokioWriteTransaction {
            file: Some(file),
            staging,
            destination: path.to_path_buf(),
            written: 0,
        }))
    }
}

/// Write transaction over a staging file.
struct TokioWriteTransaction {
    file: Option<fs::File>,
    staging: PathBuf,
    destination: PathBuf,
    written: u64,
}

impl TokioWriteTransaction {
    fn file(&mut self) -> Result<&mut fs::File> {
        self.file
            .as_mut()
            .ok_or_else(|| BridgeError::OperationFailed("write transaction closed".to_string()))
    }
}

#[async_trait]
impl WriteTransaction for TokioWriteTransaction {
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        self.file()?
            .write_all(chunk)
            .await
            .map_err(TokioFileSystem::map_io_error)?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<u64> {
        let mut file = self
            .file
            .take()
            .ok_or_else(|| BridgeError::OperationFailed("write transaction closed".to_string()))?;

        let synced = async {
            file.flush().await?;
            file.sync_all().await
        }
        .await;
        drop(file);

        let renamed = match synced {
            Ok(()) => fs::rename(&self.staging, &self.destination).await,
            Err(e) => Err(e),
        };

        if let Err(e) = renamed {
            if let Err(cleanup) = fs::remove_file(&self.staging).await {
                warn!(path = ?self.staging, error = %cleanup, "Failed to remove staging file");
            }
            return Err(TokioFileSystem::map_io_error(e));
        }

        debug!(path = ?self.destination, size = self.written, "Committed file");
        Ok(self.written)
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        drop(self.file.take());
        match fs::remove_file(&self.staging).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(TokioFileSystem::map_io_error(e)),
        }
        debug!(path = ?self.destination, discarded = self.written, "Rolled back write");
        Ok(())
    }
}

impl Drop for TokioWriteTransaction {
    fn drop(&mut self) {
        // Abandoned without commit or rollback, e.g. a cancelled download.
        if self.file.take().is_some() {
            if let Err(e) = std::fs::remove_file(&self.staging) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = ?self.staging, error = %e, "Failed to remove staging file");
                }
            }
        }
    }
}
