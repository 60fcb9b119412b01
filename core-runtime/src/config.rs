//! # Backup Configuration Module
//!
//! Provides configuration management for the photo backup core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a
//! `BackupConfig` instance that holds the destination, the retry settings for
//! each phase and the host bridges the pipeline runs on. It enforces
//! fail-fast validation so that a misconfigured run is rejected before a
//! single asset is touched.
//!
//! ## Required Settings
//!
//! - `destination` - Root of the local backup tree
//!
//! ## Bridges (with platform defaults)
//!
//! - `FileSystemAccess` - File I/O (desktop default: tokio fs)
//! - `Sleeper` - Backoff waits (desktop default: tokio timer)
//! - `Clock` - Report timestamps (default: system clock)
//!
//! When the `desktop-shims` feature is enabled, the desktop implementations
//! are injected automatically if not provided. Without it, a missing bridge
//! is reported as [`Error::CapabilityMissing`].
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{BackupConfig, RetryMode};
//!
//! let config = BackupConfig::builder()
//!     .destination("/mnt/backup/photos")
//!     .retry_mode(RetryMode::Unbounded)
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{Clock, FileSystemAccess, Sleeper, SystemClock};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default number of attempts per asset in bounded mode.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default buffer size for the backup event bus.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

/// Upper bound applied to every computed backoff delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10 * 60);

/// How persistent a phase is when an attempt fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RetryMode {
    /// Give up on an asset after `max_attempts` failed attempts.
    ///
    /// Unclassified errors are not retried, and any failed asset blocks the
    /// deletion pass.
    Bounded { max_attempts: u32 },
    /// Retry until success or until the run is stopped.
    Unbounded,
}

impl Default for RetryMode {
    fn default() -> Self {
        RetryMode::Bounded {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl RetryMode {
    pub fn is_bounded(&self) -> bool {
        matches!(self, RetryMode::Bounded { .. })
    }
}

/// Wait parameters for one phase of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Multiplied by the attempt number after a rate-limit response
    pub rate_limit_unit: Duration,
    /// Fixed wait after a dropped connection or timeout
    pub transient_delay: Duration,
    /// Wait after an unclassified error in unbounded mode
    pub fallback_delay: Duration,
    /// Cap applied to every computed delay
    pub max_delay: Duration,
}

impl BackoffConfig {
    /// Download phase defaults: 30s rate-limit unit, 10s transient, 5s fallback.
    pub fn downloads() -> Self {
        Self {
            rate_limit_unit: Duration::from_secs(30),
            transient_delay: Duration::from_secs(10),
            fallback_delay: Duration::from_secs(5),
            max_delay: DEFAULT_MAX_DELAY,
        }
    }

    /// Delete phase defaults: 10s rate-limit unit, 10s transient, 5s fallback.
    pub fn deletes() -> Self {
        Self {
            rate_limit_unit: Duration::from_secs(10),
            ..Self::downloads()
        }
    }

    pub fn with_rate_limit_unit(mut self, unit: Duration) -> Self {
        self.rate_limit_unit = unit;
        self
    }

    pub fn with_transient_delay(mut self, delay: Duration) -> Self {
        self.transient_delay = delay;
        self
    }

    pub fn with_fallback_delay(mut self, delay: Duration) -> Self {
        self.fallback_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Validates the delays, naming the phase in error messages
    pub fn validate(&self, setting: &'static str) -> Result<()> {
        let delays = [
            ("rate_limit_unit", self.rate_limit_unit),
            ("transient_delay", self.transient_delay),
            ("fallback_delay", self.fallback_delay),
        ];

        for (name, delay) in delays {
            if delay.is_zero() {
                return Err(Error::InvalidSetting {
                    setting,
                    message: format!("{} must be greater than zero", name),
                });
            }
            if delay > self.max_delay {
                return Err(Error::InvalidSetting {
                    setting,
                    message: format!(
                        "{} ({:?}) exceeds max_delay ({:?})",
                        name, delay, self.max_delay
                    ),
                });
            }
        }

        Ok(())
    }
}

/// Configuration for one backup run.
///
/// Use [`BackupConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct BackupConfig {
    /// Root of the local backup tree
    pub destination: PathBuf,

    /// Retry persistence, shared by both phases
    pub retry_mode: RetryMode,

    /// Waits used while downloading
    pub download_backoff: BackoffConfig,

    /// Waits used while deleting remote originals
    pub delete_backoff: BackoffConfig,

    /// Capacity of the event bus created for a run
    pub event_buffer_size: usize,

    /// File system access abstraction
    pub file_system: Arc<dyn FileSystemAccess>,

    /// Backoff wait implementation
    pub sleeper: Arc<dyn Sleeper>,

    /// Time source for report timestamps
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for BackupConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupConfig")
            .field("destination", &self.destination)
            .field("retry_mode", &self.retry_mode)
            .field("download_backoff", &self.download_backoff)
            .field("delete_backoff", &self.delete_backoff)
            .field("event_buffer_size", &self.event_buffer_size)
            .field("file_system", &"FileSystemAccess { ... }")
            .field("sleeper", &"Sleeper { ... }")
            .field("clock", &"Clock { ... }")
            .finish()
    }
}

impl BackupConfig {
    /// Creates a new builder for constructing a `BackupConfig`.
    pub fn builder() -> BackupConfigBuilder {
        BackupConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Destination is not empty
    /// - Bounded mode allows at least one attempt
    /// - Backoff delays are non-zero and within their cap
    /// - Event buffer can hold at least one event
    pub fn validate(&self) -> Result<()> {
        if self.destination.as_os_str().is_empty() {
            return Err(Error::Config("Destination cannot be empty".to_string()));
        }

        if let RetryMode::Bounded { max_attempts } = self.retry_mode {
            if max_attempts == 0 {
                return Err(Error::InvalidSetting {
                    setting: "retry_mode",
                    message: "max_attempts must be at least 1".to_string(),
                });
            }
        }

        self.download_backoff.validate("download_backoff")?;
        self.delete_backoff.validate("delete_backoff")?;

        if self.event_buffer_size == 0 {
            return Err(Error::InvalidSetting {
                setting: "event_buffer_size",
                message: "event buffer must hold at least one event".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn capability_missing(capability: &str, purpose: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: format!(
            "{} implementation is required for {}. \
             Desktop: ensure the 'desktop-shims' feature is enabled to use the default. \
             Other hosts: inject a platform implementation through the builder.",
            capability, purpose
        ),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_file_system() -> Result<Arc<dyn FileSystemAccess>> {
    use bridge_desktop::TokioFileSystem;

    Ok(Arc::new(TokioFileSystem::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_file_system() -> Result<Arc<dyn FileSystemAccess>> {
    Err(capability_missing("FileSystemAccess", "writing the backup tree"))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_sleeper() -> Result<Arc<dyn Sleeper>> {
    use bridge_desktop::TokioSleeper;

    Ok(Arc::new(TokioSleeper))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_sleeper() -> Result<Arc<dyn Sleeper>> {
    Err(capability_missing("Sleeper", "backoff waits between retries"))
}

/// Builder for constructing [`BackupConfig`] instances.
///
/// Call [`build()`](BackupConfigBuilder::build) once all settings are in
/// place; missing or inconsistent settings are reported there.
#[derive(Default)]
pub struct BackupConfigBuilder {
    destination: Option<PathBuf>,
    retry_mode: Option<RetryMode>,
    download_backoff: Option<BackoffConfig>,
    delete_backoff: Option<BackoffConfig>,
    event_buffer_size: Option<usize>,
    file_system: Option<Arc<dyn FileSystemAccess>>,
    sleeper: Option<Arc<dyn Sleeper>>,
    clock: Option<Arc<dyn Clock>>,
}

impl BackupConfigBuilder {
    /// Sets the root of the local backup tree.
    ///
    /// # Examples
    ///
    /// ```
    /// use core_runtime::config::BackupConfig;
    ///
    /// let builder = BackupConfig::builder()
    ///     .destination("/mnt/backup/photos");
    /// ```
    pub fn destination<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.destination = Some(path.into());
        self
    }

    /// Sets the retry mode.
    ///
    /// Default: `Bounded { max_attempts: 5 }`
    pub fn retry_mode(mut self, mode: RetryMode) -> Self {
        self.retry_mode = Some(mode);
        self
    }

    /// Shorthand for `retry_mode(RetryMode::Bounded { max_attempts })`.
    pub fn max_attempts(self, max_attempts: u32) -> Self {
        self.retry_mode(RetryMode::Bounded { max_attempts })
    }

    /// Sets the download phase waits.
    ///
    /// Default: [`BackoffConfig::downloads`]
    pub fn download_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.download_backoff = Some(backoff);
        self
    }

    /// Sets the delete phase waits.
    ///
    /// Default: [`BackoffConfig::deletes`]
    pub fn delete_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.delete_backoff = Some(backoff);
        self
    }

    /// Sets the event bus capacity.
    ///
    /// Default: 256
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Sets the file system access implementation.
    ///
    /// If not provided, the desktop default (tokio fs-based) will be used when
    /// the `desktop-shims` feature is enabled.
    ///
    /// ```ignore
    /// use core_runtime::config::BackupConfig;
    /// use std::sync::Arc;
    ///
    /// let builder = BackupConfig::builder()
    ///     .file_system(Arc::new(MyFileSystem));
    /// ```
    pub fn file_system(mut self, fs: Arc<dyn FileSystemAccess>) -> Self {
        self.file_system = Some(fs);
        self
    }

    /// Sets the backoff wait implementation.
    ///
    /// If not provided, the desktop default (tokio timer) will be used when
    /// the `desktop-shims` feature is enabled.
    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = Some(sleeper);
        self
    }

    /// Sets the time source used for report timestamps.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the final `BackupConfig` instance.
    ///
    /// # Returns
    ///
    /// Returns `Ok(BackupConfig)` on success, or an error if:
    /// - The destination is missing
    /// - A bridge is missing and no desktop default is available
    /// - Retry or backoff values are invalid
    pub fn build(self) -> Result<BackupConfig> {
        let destination = self.destination.ok_or_else(|| {
            Error::Config("Destination is required. Use .destination() to set it.".to_string())
        })?;

        let file_system = match self.file_system {
            Some(fs) => fs,
            None => provide_default_file_system()?,
        };

        let sleeper = match self.sleeper {
            Some(sleeper) => sleeper,
            None => provide_default_sleeper()?,
        };

        let config = BackupConfig {
            destination,
            retry_mode: self.retry_mode.unwrap_or_default(),
            download_backoff: self.download_backoff.unwrap_or_else(BackoffConfig::downloads),
            delete_backoff: self.delete_backoff.unwrap_or_else(BackoffConfig::deletes),
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            file_system,
            sleeper,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::storage::{FileMetadata, WriteTransaction};
    use bridge_traits::BridgeError;
    use std::path::Path;

    struct NullFileSystem;

    #[async_trait]
    impl FileSystemAccess for NullFileSystem {
        async fn exists(&self, _path: &Path) -> BridgeResult<bool> {
            Ok(false)
        }

        async fn metadata(&self, path: &Path) -> BridgeResult<FileMetadata> {
            Err(BridgeError::NotFound(path.display().to_string()))
        }

        async fn create_dir_all(&self, _path: &Path) -> BridgeResult<()> {
            Ok(())
        }

        async fn delete_file(&self, _path: &Path) -> BridgeResult<()> {
            Ok(())
        }

        async fn begin_write(&self, _path: &Path) -> BridgeResult<Box<dyn WriteTransaction>> {
            Err(BridgeError::NotAvailable("writes".to_string()))
        }
    }

    struct NoopSleeper;

    #[async_trait]
    impl Sleeper for NoopSleeper {
        async fn sleep(&self, _duration: Duration) {}
    }

    fn builder() -> BackupConfigBuilder {
        BackupConfig::builder()
            .destination("/backup")
            .file_system(Arc::new(NullFileSystem))
            .sleeper(Arc::new(NoopSleeper))
    }

    #[test]
    fn test_defaults() {
        let config = builder().build().unwrap();

        assert_eq!(config.destination, PathBuf::from("/backup"));
        assert_eq!(config.retry_mode, RetryMode::Bounded { max_attempts: 5 });
        assert_eq!(
            config.download_backoff.rate_limit_unit,
            Duration::from_secs(30)
        );
        assert_eq!(config.delete_backoff.rate_limit_unit, Duration::from_secs(10));
        assert_eq!(config.delete_backoff.transient_delay, Duration::from_secs(10));
        assert_eq!(config.download_backoff.fallback_delay, Duration::from_secs(5));
        assert_eq!(config.download_backoff.max_delay, DEFAULT_MAX_DELAY);
        assert_eq!(config.event_buffer_size, DEFAULT_EVENT_BUFFER_SIZE);
    }

    #[test]
    fn test_missing_destination() {
        let result = BackupConfig::builder()
            .file_system(Arc::new(NullFileSystem))
            .sleeper(Arc::new(NoopSleeper))
            .build();

        match result {
            Err(Error::Config(msg)) => assert!(msg.contains("Destination is required")),
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_destination() {
        let result = builder().destination("").build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let result = builder().max_attempts(0).build();
        assert!(matches!(
            result,
            Err(Error::InvalidSetting {
                setting: "retry_mode",
                ..
            })
        ));
    }

    #[test]
    fn test_zero_delay_rejected() {
        let backoff = BackoffConfig::downloads().with_transient_delay(Duration::ZERO);
        let result = builder().download_backoff(backoff).build();

        match result {
            Err(Error::InvalidSetting { setting, message }) => {
                assert_eq!(setting, "download_backoff");
                assert!(message.contains("transient_delay"));
            }
            other => panic!("expected invalid setting, got {:?}", other),
        }
    }

    #[test]
    fn test_unit_above_cap_rejected() {
        let backoff = BackoffConfig::deletes()
            .with_max_delay(Duration::from_secs(5))
            .with_fallback_delay(Duration::from_secs(1));
        let result = builder().delete_backoff(backoff).build();

        match result {
            Err(Error::InvalidSetting { setting, message }) => {
                assert_eq!(setting, "delete_backoff");
                assert!(message.contains("rate_limit_unit"));
            }
            other => panic!("expected invalid setting, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_event_buffer_rejected() {
        let result = builder().event_buffer_size(0).build();
        assert!(matches!(result, Err(Error::InvalidSetting { .. })));
    }

    #[test]
    fn test_unbounded_mode() {
        let config = builder().retry_mode(RetryMode::Unbounded).build().unwrap();
        assert!(!config.retry_mode.is_bounded());
    }

    #[test]
    fn test_retry_mode_serialization() {
        let json = serde_json::to_string(&RetryMode::Bounded { max_attempts: 3 }).unwrap();
        assert_eq!(json, r#"{"mode":"bounded","max_attempts":3}"#);

        let unbounded: RetryMode = serde_json::from_str(r#"{"mode":"unbounded"}"#).unwrap();
        assert_eq!(unbounded, RetryMode::Unbounded);
    }

    #[test]
    fn test_backoff_round_trips_through_json() {
        let backoff = BackoffConfig::downloads().with_rate_limit_unit(Duration::from_secs(45));
        let json = serde_json::to_string(&backoff).unwrap();
        let restored: BackoffConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, backoff);
    }

    #[test]
    fn test_debug_hides_bridges() {
        let config = builder().build().unwrap();
        let debug = format!("{:?}", config);
        assert!(debug.contains("FileSystemAccess { ... }"));
        assert!(debug.contains("/backup"));
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_missing_file_system_without_shims() {
        let result = BackupConfig::builder()
            .destination("/backup")
            .sleeper(Arc::new(NoopSleeper))
            .build();

        match result {
            Err(Error::CapabilityMissing { capability, .. }) => {
                assert_eq!(capability, "FileSystemAccess")
            }
            other => panic!("expected capability error, got {:?}", other),
        }
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_missing_sleeper_without_shims() {
        let result = BackupConfig::builder()
            .destination("/backup")
            .file_system(Arc::new(NullFileSystem))
            .build();

        assert!(matches!(
            result,
            Err(Error::CapabilityMissing { ref capability, .. }) if capability == "Sleeper"
        ));
    }

    #[cfg(feature = "desktop-shims")]
    #[test]
    fn test_build_with_desktop_defaults() {
        let config = BackupConfig::builder()
            .destination("/backup")
            .build()
            .expect("desktop defaults should succeed");

        assert_eq!(config.retry_mode, RetryMode::default());
    }
}
