//! # Core Backup Module
//!
//! Backs up a remote photo library into a local, date-organized tree and
//! optionally deletes the remote originals once every copy is verified.
//!
//! ## Overview
//!
//! - **Path planning** ([`PathPlanner`]): `base/YYYY/MM/{Foto,Video}/filename`
//! - **Local store** ([`LocalStore`]): validity checks and transactional writes
//! - **Retry policy** ([`RetryPolicy`]): failure classification and backoff
//! - **Transfer engine** ([`TransferEngine`]): per-asset download loop
//! - **Pipeline** ([`BackupPipeline`]): download phase, deletion gate and
//!   deletion phase
//!
//! Assets are processed one at a time. Every retry, skip, download and
//! failure is published on the [`EventBus`](core_runtime::events::EventBus)
//! as a [`BackupEvent`](core_runtime::events::BackupEvent).
//!
//! ## Usage
//!
//! ```ignore
//! use core_backup::{BackupPipeline, DeletionGate};
//! use core_runtime::config::BackupConfig;
//! use core_runtime::events::EventBus;
//!
//! let config = BackupConfig::builder().destination("/mnt/photos").build()?;
//! let pipeline = BackupPipeline::new(config, EventBus::new(256));
//!
//! let report = pipeline
//!     .execute(&service, &|report: &DownloadReport| report.summary.failed == 0)
//!     .await?;
//! if report.gate == DeletionGate::Confirmed {
//!     println!("{:?}", report.deletion);
//! }
//! ```

pub mod error;
pub mod local_store;
pub mod path_planner;
pub mod pipeline;
pub mod report;
pub mod retry;
pub mod transfer;

pub use error::{BackupError, Result};
pub use local_store::LocalStore;
pub use path_planner::{media_kind, DestinationPath, MediaKind, PathPlanner};
pub use pipeline::{BackupPipeline, DeletionDecision};
pub use report::{
    AssetFailure, AssetRecord, DeletionGate, DeletionOutcome, DeletionRecord, DeletionReport,
    DeletionSummary, DownloadReport, RunId, RunReport, RunSummary, TransferOutcome,
};
pub use retry::{
    classify_bridge_error, classify_failure, classify_message, FailureClass, RetryDecision,
    RetryPolicy,
};
pub use transfer::TransferEngine;
