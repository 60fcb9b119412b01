use bridge_traits::BridgeError;
use std::path::PathBuf;
use thiserror::Error;

use crate::report::DownloadReport;
use crate::retry::{classify_bridge_error, FailureClass};

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Rate limited by remote service: {0}")]
    RateLimited(String),

    #[error("Transient network failure: {0}")]
    TransientNetwork(String),

    #[error("Remote service refused the request: {0}")]
    NonRetryableRemote(String),

    #[error("Remote error: {0}")]
    Remote(#[from] BridgeError),

    #[error("Local I/O error at {path}: {source}")]
    LocalIo {
        path: PathBuf,
        #[source]
        source: BridgeError,
    },

    #[error("Destination {path} is not writable: {reason}")]
    DestinationUnwritable { path: PathBuf, reason: String },

    #[error("Local file {0} failed verification")]
    CorruptLocalFile(PathBuf),

    #[error("Download of {0} produced no data")]
    EmptyDownload(String),

    #[error("Invalid asset {asset_id}: {reason}")]
    InvalidAsset { asset_id: String, reason: String },

    #[error("Deletion blocked: {0}")]
    DeletionBlocked(String),

    #[error("Failed to list remote library: {0}")]
    Listing(#[source] BridgeError),

    #[error("Backup cancelled")]
    Cancelled,

    #[error("Download phase aborted: {source}")]
    Aborted {
        report: Box<DownloadReport>,
        #[source]
        source: Box<BackupError>,
    },

    #[error(transparent)]
    Runtime(#[from] core_runtime::Error),
}

impl BackupError {
    /// Re-express an unclassified remote error as its typed failure.
    ///
    /// Used when an attempt is given up so that reports name the kind of
    /// failure rather than the raw collaborator error.
    pub fn classified(self) -> BackupError {
        let BackupError::Remote(source) = self else {
            return self;
        };

        match classify_bridge_error(&source) {
            FailureClass::RateLimited => BackupError::RateLimited(source.to_string()),
            FailureClass::Transient => BackupError::TransientNetwork(source.to_string()),
            FailureClass::Permanent => BackupError::NonRetryableRemote(source.to_string()),
            _ => BackupError::Remote(source),
        }
    }

    /// Whether this error must stop the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BackupError::DestinationUnwritable { .. } | BackupError::Aborted { .. }
        )
    }

    /// Download report completed before the run was aborted.
    pub fn partial_report(&self) -> Option<&DownloadReport> {
        match self {
            BackupError::Aborted { report, .. } => Some(&**report),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
