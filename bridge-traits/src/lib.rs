//! # Host Bridge Traits
//!
//! Abstraction traits the backup core depends on but does not implement.
//!
//! ## Overview
//!
//! This crate defines the contract between the backup core and the
//! environment it runs in. Each trait is a capability the core needs that
//! differs per host: the remote photo service, the local file system, the
//! way time passes, and where log lines end up.
//!
//! ## Traits
//!
//! ### Remote collaborator
//! - [`PhotoService`](photos::PhotoService) - Sign-in, two-factor, library listing
//! - [`RemoteAsset`](photos::RemoteAsset) - Download and delete of one item
//!
//! ### Local storage
//! - [`FileSystemAccess`](storage::FileSystemAccess) - Backup tree maintenance
//! - [`WriteTransaction`](storage::WriteTransaction) - All-or-nothing file writes
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`Sleeper`](time::Sleeper) - Backoff waits
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Remote
//! implementations should map what they know about a failure (status code,
//! throttling, connection loss) to the matching structured variant rather
//! than a free-form message.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so handles can be shared across
//! async tasks.

pub mod error;
pub mod photos;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use photos::{AuthChallenge, ByteStream, Credentials, DownloadBody, PhotoService, RemoteAsset};
pub use storage::{FileMetadata, FileSystemAccess, WriteTransaction};
pub use time::{Clock, ConsoleLogger, LogEntry, LogLevel, LoggerSink, Sleeper, SystemClock};
