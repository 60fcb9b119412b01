//! # Retry Policy
//!
//! Decides what happens after a failed attempt: wait and try again, or give
//! up on the asset.
//!
//! Failures are first sorted into a [`FailureClass`]. Structured
//! [`BridgeError`] variants are trusted first; the substring matching in
//! [`classify_message`] only applies to `BridgeError::OperationFailed`, the
//! variant collaborators use when the remote API describes an error in prose.
//!
//! | Class         | Decision                                            |
//! |---------------|-----------------------------------------------------|
//! | RateLimited   | `attempt × rate_limit_unit` (or server retry-after) |
//! | Transient     | `transient_delay`                                   |
//! | CorruptLocal  | `transient_delay`                                   |
//! | Unknown       | bounded: give up, unbounded: `fallback_delay`       |
//! | Permanent     | give up                                             |
//! | LocalFatal    | give up (escalated by the engine)                   |
//!
//! Bounded mode additionally gives up once the attempt budget is spent.
//! Every delay is capped at `BackoffConfig::max_delay`.

use bridge_traits::{BridgeError, Sleeper};
use core_runtime::config::{BackoffConfig, BackupConfig, RetryMode};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::BackupError;

/// Coarse kind of a failure, as far as retrying is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Service-side throttling (429, 503, "service unavailable")
    RateLimited,
    /// Connection-level trouble that usually clears up by itself
    Transient,
    /// The remote refused for good (missing asset, no permission)
    Permanent,
    /// Nothing recognisable
    Unknown,
    /// The destination cannot be written to
    LocalFatal,
    /// A local file failed verification after writing
    CorruptLocal,
}

impl FailureClass {
    /// Whether waiting can resolve this kind of failure in principle.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FailureClass::RateLimited | FailureClass::Transient | FailureClass::CorruptLocal
        )
    }
}

/// Outcome of [`RetryPolicy::classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait at least this long, then try again
    RetryAfter(Duration),
    /// Stop trying
    NonRetryable,
}

/// Sort a pipeline error into a [`FailureClass`].
pub fn classify_failure(error: &BackupError) -> FailureClass {
    match error {
        BackupError::RateLimited(_) => FailureClass::RateLimited,
        BackupError::TransientNetwork(_) => FailureClass::Transient,
        BackupError::NonRetryableRemote(_) => FailureClass::Permanent,
        BackupError::Remote(source) => classify_bridge_error(source),
        BackupError::LocalIo { source, .. } => {
            if is_fatal_local(source) {
                FailureClass::LocalFatal
            } else {
                FailureClass::Unknown
            }
        }
        BackupError::DestinationUnwritable { .. } | BackupError::Aborted { .. } => {
            FailureClass::LocalFatal
        }
        BackupError::CorruptLocalFile(_) => FailureClass::CorruptLocal,
        BackupError::EmptyDownload(_) => FailureClass::Transient,
        BackupError::InvalidAsset { .. } | BackupError::DeletionBlocked(_) => {
            FailureClass::Permanent
        }
        BackupError::Listing(_) | BackupError::Cancelled | BackupError::Runtime(_) => {
            FailureClass::Unknown
        }
    }
}

/// Sort a collaborator error into a [`FailureClass`].
pub fn classify_bridge_error(error: &BridgeError) -> FailureClass {
    match error {
        BridgeError::RateLimited { .. } => FailureClass::RateLimited,
        BridgeError::Http { status, message } => match *status {
            429 | 503 => FailureClass::RateLimited,
            408 => FailureClass::Transient,
            500..=599 => FailureClass::Transient,
            400..=499 => FailureClass::Permanent,
            _ => classify_message(message),
        },
        BridgeError::Network(_) | BridgeError::Timeout(_) => FailureClass::Transient,
        BridgeError::NotFound(_) | BridgeError::PermissionDenied(_) => FailureClass::Permanent,
        BridgeError::NotAvailable(_) => FailureClass::Permanent,
        BridgeError::Io(io) => match io.kind() {
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionRefused
            | ErrorKind::TimedOut
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof
            | ErrorKind::Interrupted => FailureClass::Transient,
            ErrorKind::NotFound | ErrorKind::PermissionDenied => FailureClass::Permanent,
            _ => FailureClass::Unknown,
        },
        BridgeError::OperationFailed(message) => classify_message(message),
    }
}

/// Last-resort classification of an unstructured error message.
///
/// Rate-limit markers are checked before connection markers, since a
/// "503 Service Unavailable: connection closed" is throttling.
pub fn classify_message(message: &str) -> FailureClass {
    const RATE_LIMIT_MARKERS: &[&str] = &[
        "503",
        "service unavailable",
        "rate limit",
        "too many requests",
        "429",
    ];
    const TRANSIENT_MARKERS: &[&str] = &[
        "connection",
        "timed out",
        "timeout",
        "socket",
        "reset by peer",
    ];

    let message = message.to_lowercase();
    if RATE_LIMIT_MARKERS.iter().any(|m| message.contains(m)) {
        FailureClass::RateLimited
    } else if TRANSIENT_MARKERS.iter().any(|m| message.contains(m)) {
        FailureClass::Transient
    } else {
        FailureClass::Unknown
    }
}

/// Whether a local write error means the destination itself is unusable.
pub(crate) fn is_fatal_local(error: &BridgeError) -> bool {
    match error {
        BridgeError::PermissionDenied(_) => true,
        BridgeError::Io(io) => matches!(
            io.kind(),
            ErrorKind::StorageFull
                | ErrorKind::ReadOnlyFilesystem
                | ErrorKind::PermissionDenied
                | ErrorKind::QuotaExceeded
        ),
        _ => false,
    }
}

/// Per-phase retry policy.
///
/// Holds no per-asset state: the caller passes the attempt number, so one
/// policy can serve every asset of a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    mode: RetryMode,
    backoff: BackoffConfig,
}

impl RetryPolicy {
    pub fn new(mode: RetryMode, backoff: BackoffConfig) -> Self {
        Self { mode, backoff }
    }

    /// Policy for the download phase of `config`
    pub fn for_downloads(config: &BackupConfig) -> Self {
        Self::new(config.retry_mode, config.download_backoff)
    }

    /// Policy for the deletion phase of `config`
    pub fn for_deletes(config: &BackupConfig) -> Self {
        Self::new(config.retry_mode, config.delete_backoff)
    }

    pub fn mode(&self) -> RetryMode {
        self.mode
    }

    pub fn backoff(&self) -> &BackoffConfig {
        &self.backoff
    }

    /// Decide what to do after attempt number `attempt` (1-based) failed
    /// with `error`.
    pub fn classify(&self, error: &BackupError, attempt: u32) -> RetryDecision {
        if let RetryMode::Bounded { max_attempts } = self.mode {
            if attempt >= max_attempts {
                return RetryDecision::NonRetryable;
            }
        }

        let delay = match classify_failure(error) {
            FailureClass::RateLimited => {
                let linear = self.backoff.rate_limit_unit.saturating_mul(attempt.max(1));
                linear.max(server_retry_after(error).unwrap_or_default())
            }
            FailureClass::Transient | FailureClass::CorruptLocal => self.backoff.transient_delay,
            FailureClass::Unknown if !self.mode.is_bounded() => self.backoff.fallback_delay,
            FailureClass::Unknown | FailureClass::Permanent | FailureClass::LocalFatal => {
                return RetryDecision::NonRetryable;
            }
        };

        RetryDecision::RetryAfter(delay.min(self.backoff.max_delay))
    }
}

fn server_retry_after(error: &BackupError) -> Option<Duration> {
    match error {
        BackupError::Remote(BridgeError::RateLimited { retry_after }) => *retry_after,
        _ => None,
    }
}

/// Wait for `delay` unless `cancel` fires first.
///
/// Returns `false` when the wait was interrupted.
pub(crate) async fn wait_or_stop(
    sleeper: &dyn Sleeper,
    cancel: &CancellationToken,
    delay: Duration,
) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = sleeper.sleep(delay) => true,
    }
}
