//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `FileSystemAccess` using `tokio::fs`, with writes staged in a sibling
//!   `.part` file and renamed into place on commit
//! - `Sleeper` using `tokio::time::sleep`
//!
//! The remote photo service is not part of this crate; hosts provide their
//! own `PhotoService` implementation.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{TokioFileSystem, TokioSleeper};
//! use std::sync::Arc;
//!
//! let config = BackupConfig::builder()
//!     .destination("/mnt/backup/photos")
//!     .file_system(Arc::new(TokioFileSystem::new()))
//!     .sleeper(Arc::new(TokioSleeper))
//!     .build()?;
//! ```

mod filesystem;
mod sleeper;

pub use filesystem::TokioFileSystem;
pub use sleeper::TokioSleeper;
