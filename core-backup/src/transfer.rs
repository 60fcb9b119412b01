//! # Transfer Engine
//!
//! Brings one remote asset to a verified local copy.
//!
//! ```text
//! CheckExisting ──valid──▶ Skipped
//!      │
//!      └─missing/empty──▶ Download ──ok──▶ Verify ──ok──▶ Downloaded
//!                            │                │
//!                            └──error─────────┴──▶ RetryPolicy
//!                                                   ├─ RetryAfter(d): wait d, back to CheckExisting
//!                                                   └─ NonRetryable:  Failed
//! ```
//!
//! Each retry re-checks the destination first, so a copy that became valid
//! in the meantime is not downloaded again. Per-asset errors end as
//! [`TransferOutcome::Failed`]; only an unwritable destination and a stop
//! request surface as `Err`.

use bridge_traits::{RemoteAsset, Sleeper};
use core_runtime::events::{BackupEvent, BackupPhase, CoreEvent, EventBus};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{BackupError, Result};
use crate::local_store::LocalStore;
use crate::path_planner::{DestinationPath, PathPlanner};
use crate::report::{RunId, TransferOutcome};
use crate::retry::{wait_or_stop, RetryDecision, RetryPolicy};

/// Per-asset download loop.
pub struct TransferEngine {
    store: LocalStore,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    event_bus: EventBus,
    cancel: CancellationToken,
    run_id: RunId,
}

impl TransferEngine {
    pub fn new(
        store: LocalStore,
        policy: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
        event_bus: EventBus,
        run_id: RunId,
    ) -> Self {
        Self {
            store,
            policy,
            sleeper,
            event_bus,
            cancel: CancellationToken::new(),
            run_id,
        }
    }

    /// Interrupt backoff waits when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Transfer `asset` into the tree rooted at `base`.
    ///
    /// # Errors
    ///
    /// - [`BackupError::DestinationUnwritable`] if the destination cannot be
    ///   written at all
    /// - [`BackupError::Cancelled`] if a stop was requested during a backoff wait
    #[instrument(skip(self, asset, base), fields(asset_id = %asset.id()))]
    pub async fn transfer(&self, asset: &dyn RemoteAsset, base: &Path) -> Result<TransferOutcome> {
        match PathPlanner::plan(asset, base) {
            Ok(destination) => self.transfer_to(asset, &destination).await,
            Err(e) => Ok(self.give_up(asset.id(), e)),
        }
    }

    /// Transfer `asset` to an already planned destination.
    pub async fn transfer_to(
        &self,
        asset: &dyn RemoteAsset,
        destination: &DestinationPath,
    ) -> Result<TransferOutcome> {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let error = match self.attempt(asset, destination).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) => e,
            };

            if error.is_fatal() {
                error!("Destination unusable, aborting run: {}", error);
                self.emit(BackupEvent::AssetFailed {
                    run_id: self.run_id.to_string(),
                    asset_id: asset.id().to_string(),
                    reason: error.to_string(),
                });
                return Err(error);
            }

            match self.policy.classify(&error, attempt) {
                RetryDecision::RetryAfter(delay) => {
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Download of {} failed, retrying: {}",
                        asset.filename(),
                        error
                    );
                    self.emit(BackupEvent::RetryScheduled {
                        run_id: self.run_id.to_string(),
                        asset_id: asset.id().to_string(),
                        phase: BackupPhase::Download,
                        attempt,
                        delay_ms: delay.as_millis() as u64,
                        reason: error.to_string(),
                    });

                    if !wait_or_stop(self.sleeper.as_ref(), &self.cancel, delay).await {
                        info!("Stop requested during backoff");
                        return Err(BackupError::Cancelled);
                    }
                }
                RetryDecision::NonRetryable => {
                    return Ok(self.give_up(asset.id(), error));
                }
            }
        }
    }

    async fn attempt(
        &self,
        asset: &dyn RemoteAsset,
        destination: &DestinationPath,
    ) -> Result<TransferOutcome> {
        let path = destination.as_path();
        self.store.ensure_dir(&destination.directory).await?;

        if self.store.is_valid(path).await? {
            debug!(path = ?path, "Already backed up");
            self.emit(BackupEvent::AssetSkipped {
                run_id: self.run_id.to_string(),
                asset_id: asset.id().to_string(),
                destination: destination.to_string(),
            });
            return Ok(TransferOutcome::Skipped);
        }

        if self.store.remove_if_invalid(path).await? {
            info!("Replacing corrupt local copy of {}", asset.filename());
        }

        let body = asset.download().await?;
        let bytes = self
            .store
            .write_stream(path, body, asset.size_hint())
            .await?;

        if !self.store.is_valid(path).await? {
            return Err(BackupError::CorruptLocalFile(path.to_path_buf()));
        }

        debug!(path = ?path, bytes, "Downloaded");
        self.emit(BackupEvent::AssetDownloaded {
            run_id: self.run_id.to_string(),
            asset_id: asset.id().to_string(),
            destination: destination.to_string(),
            bytes,
        });
        Ok(TransferOutcome::Downloaded { bytes })
    }

    fn give_up(&self, asset_id: &str, error: BackupError) -> TransferOutcome {
        let reason = error.classified().to_string();
        error!("Giving up on asset {}: {}", asset_id, reason);
        self.emit(BackupEvent::AssetFailed {
            run_id: self.run_id.to_string(),
            asset_id: asset_id.to_string(),
            reason: reason.clone(),
        });
        TransferOutcome::Failed { reason }
    }

    fn emit(&self, event: BackupEvent) {
        self.event_bus.emit(CoreEvent::Backup(event)).ok();
    }
}
