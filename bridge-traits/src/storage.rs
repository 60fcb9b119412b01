//! Storage and File System Abstractions
//!
//! Provides the platform-agnostic file I/O trait the backup core writes
//! through. Writes go through a [`WriteTransaction`] so that a destination is
//! only ever replaced by a fully written file.

use async_trait::async_trait;
use std::path::Path;

use crate::error::Result;

/// File metadata information
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub size: u64,
    pub modified_at: Option<i64>,
    pub is_directory: bool,
}

/// File system access trait
///
/// Abstracts the file operations needed to maintain a local backup tree.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::FileSystemAccess;
///
/// async fn save(fs: &dyn FileSystemAccess, path: &Path, data: &[u8]) -> Result<u64> {
///     let mut tx = fs.begin_write(path).await?;
///     tx.write_chunk(data).await?;
///     tx.commit().await
/// }
/// ```
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    /// Check if a file or directory exists
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Get metadata for a file or directory
    async fn metadata(&self, path: &Path) -> Result<FileMetadata>;

    /// Create a directory and all parent directories if they don't exist
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Delete a file
    async fn delete_file(&self, path: &Path) -> Result<()>;

    /// Start writing a new version of `path`.
    ///
    /// Nothing is visible at `path` until the returned transaction is
    /// committed. Dropping or rolling back the transaction leaves `path`
    /// exactly as it was.
    async fn begin_write(&self, path: &Path) -> Result<Box<dyn WriteTransaction>>;
}

/// Pending write of a single file.
#[async_trait]
pub trait WriteTransaction: Send {
    /// Append a chunk of bytes
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()>;

    /// Flush and sync the data, then move it to the destination path.
    ///
    /// Returns the number of bytes written.
    async fn commit(self: Box<Self>) -> Result<u64>;

    /// Discard everything written so far
    async fn rollback(self: Box<Self>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_metadata() {
        let metadata = FileMetadata {
            size: 1024,
            modified_at: Some(1234567900),
            is_directory: false,
        };

        assert_eq!(metadata.size, 1024);
        assert!(!metadata.is_directory);
    }
}
