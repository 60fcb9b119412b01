//! # Backup Pipeline
//!
//! Drives a whole run over a fixed asset listing:
//!
//! 1. **Download phase** ([`BackupPipeline::run`]): every asset, in listing
//!    order, one at a time, through the [`TransferEngine`].
//! 2. **Deletion gate**: decides whether remote originals may be removed.
//! 3. **Deletion phase** ([`BackupPipeline::delete_all`]): deletes the
//!    originals of assets with a verified local copy, with its own retry
//!    parameters.
//!
//! An original is only ever deleted when the download phase reported it as
//! backed up *and* the local file is still valid at deletion time.
//!
//! ## Stopping
//!
//! [`BackupPipeline::stop_handle`] returns a token that stops the run after
//! the current asset, or immediately during a backoff wait. A stopped run
//! never enters the deletion phase.
//!
//! ## Fatal errors
//!
//! A destination that cannot be written at all ends the download phase
//! early. The partial report is still completed and `PhaseCompleted` is
//! still emitted; the report travels back inside [`BackupError::Aborted`].
//!
//! ## Usage
//!
//! ```ignore
//! let pipeline = BackupPipeline::from_config(config);
//! let report = pipeline.execute(&service, &true).await?;
//! println!("{} downloaded", report.download.summary.downloaded);
//! ```

use async_trait::async_trait;
use bridge_traits::{BridgeError, PhotoService, RemoteAsset};
use core_runtime::config::BackupConfig;
use core_runtime::events::{BackupEvent, BackupPhase, CoreEvent, EventBus};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{BackupError, Result};
use crate::local_store::LocalStore;
use crate::path_planner::PathPlanner;
use crate::report::{
    AssetRecord, DeletionGate, DeletionOutcome, DeletionReport, DownloadReport, RunId, RunReport,
    TransferOutcome,
};
use crate::retry::{classify_failure, wait_or_stop, RetryDecision, RetryPolicy};
use crate::transfer::TransferEngine;

/// Caller's answer to "delete the remote originals now?".
///
/// Asked at most once per run, after the download phase, and only when the
/// gate allows deletion at all.
#[async_trait]
pub trait DeletionDecision: Send + Sync {
    async fn confirm(&self, report: &DownloadReport) -> bool;
}

#[async_trait]
impl DeletionDecision for bool {
    async fn confirm(&self, _report: &DownloadReport) -> bool {
        *self
    }
}

#[async_trait]
impl<F> DeletionDecision for F
where
    F: Fn(&DownloadReport) -> bool + Send + Sync,
{
    async fn confirm(&self, report: &DownloadReport) -> bool {
        self(report)
    }
}

/// Backup run over a photo library.
pub struct BackupPipeline {
    config: BackupConfig,
    event_bus: EventBus,
    store: LocalStore,
    cancel: CancellationToken,
}

impl BackupPipeline {
    pub fn new(config: BackupConfig, event_bus: EventBus) -> Self {
        let store = LocalStore::new(config.file_system.clone());
        Self {
            config,
            event_bus,
            store,
            cancel: CancellationToken::new(),
        }
    }

    /// Pipeline publishing on a fresh bus sized by
    /// `config.event_buffer_size`.
    pub fn from_config(config: BackupConfig) -> Self {
        let event_bus = EventBus::new(config.event_buffer_size);
        Self::new(config, event_bus)
    }

    /// Token that stops the run between assets and interrupts backoff waits.
    pub fn stop_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    /// List the library once, back it up, and delete the originals if the
    /// gate and `decision` allow it.
    ///
    /// # Errors
    ///
    /// - [`BackupError::Listing`] if the library cannot be listed
    /// - [`BackupError::Aborted`] if the backup tree cannot be written; the
    ///   error carries the partial download report
    #[instrument(skip(self, service, decision))]
    pub async fn execute(
        &self,
        service: &dyn PhotoService,
        decision: &dyn DeletionDecision,
    ) -> Result<RunReport> {
        info!("Listing remote library");
        let assets = service.list_assets().await.map_err(BackupError::Listing)?;
        info!("Discovered {} assets", assets.len());

        let download = self.run(&assets).await?;

        let gate = if download.stopped {
            DeletionGate::Stopped
        } else if self.config.retry_mode.is_bounded() && download.has_failures() {
            DeletionGate::BlockedByFailures {
                failed: download.summary.failed,
            }
        } else if !download.records.iter().any(|r| r.outcome.is_backed_up()) {
            DeletionGate::NothingToDelete
        } else if decision.confirm(&download).await {
            DeletionGate::Confirmed
        } else {
            DeletionGate::Declined
        };

        let deletion = if gate == DeletionGate::Confirmed {
            Some(self.delete_all(&assets, &download).await?)
        } else {
            info!("Deletion phase skipped: {:?}", gate);
            None
        };

        Ok(RunReport {
            download,
            deletion,
            gate,
        })
    }

    /// Download phase.
    ///
    /// Per-asset failures are recorded in the report. An asset interrupted
    /// by a stop request is left unrecorded.
    ///
    /// # Errors
    ///
    /// [`BackupError::Aborted`] when the destination becomes unwritable. The
    /// asset that hit it is recorded as failed, the remaining ones are not
    /// attempted, and the finished report is carried in the error.
    #[instrument(skip(self, assets), fields(assets = assets.len()))]
    pub async fn run(&self, assets: &[Arc<dyn RemoteAsset>]) -> Result<DownloadReport> {
        let run_id = RunId::new();
        let total = assets.len() as u64;
        let base = self.config.destination.as_path();
        let mut report = DownloadReport::new(run_id, total, self.config.clock.now());

        let engine = TransferEngine::new(
            self.store.clone(),
            RetryPolicy::for_downloads(&self.config),
            self.config.sleeper.clone(),
            self.event_bus.clone(),
            run_id,
        )
        .with_cancellation(self.cancel.clone());

        info!("Phase 1: Downloading {} assets to {}", total, base.display());
        self.emit(BackupEvent::PhaseStarted {
            run_id: run_id.to_string(),
            phase: BackupPhase::Download,
            total,
        });

        let mut fatal = None;
        let mut planned = HashSet::new();

        for (index, asset) in assets.iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!("Stop requested after {} of {} assets", index, total);
                report.stopped = true;
                break;
            }

            debug!("Processing {} ({}/{})", asset.filename(), index + 1, total);
            self.emit(BackupEvent::AssetStarted {
                run_id: run_id.to_string(),
                asset_id: asset.id().to_string(),
                filename: asset.filename().to_string(),
                index: index as u64 + 1,
                total,
            });

            let destination = PathPlanner::plan(asset.as_ref(), base).ok().map(|d| d.path);
            if let Some(path) = &destination {
                if !planned.insert(path.clone()) {
                    warn!(
                        asset_id = %asset.id(),
                        "{} maps to the same local file as an earlier asset and will count as backed up by it",
                        path.display()
                    );
                    report.shared_destinations.push(path.clone());
                }
            }

            let outcome = match engine.transfer(asset.as_ref(), base).await {
                Ok(outcome) => outcome,
                Err(BackupError::Cancelled) => {
                    info!("Stop requested while {} was pending", asset.id());
                    report.stopped = true;
                    break;
                }
                Err(e) => {
                    error!("Download phase aborted: {}", e);
                    report.aborted = Some(e.to_string());
                    let outcome = TransferOutcome::Failed {
                        reason: e.to_string(),
                    };
                    fatal = Some(e);
                    outcome
                }
            };

            report.record(AssetRecord {
                asset_id: asset.id().to_string(),
                filename: asset.filename().to_string(),
                destination,
                outcome,
            });

            let summary = report.summary;
            self.emit(BackupEvent::Progress {
                run_id: run_id.to_string(),
                processed: summary.processed(),
                total,
                downloaded: summary.downloaded,
                skipped: summary.skipped,
                failed: summary.failed,
            });

            if fatal.is_some() {
                break;
            }
        }

        if report.stopped {
            self.emit(BackupEvent::Stopped {
                run_id: run_id.to_string(),
                phase: BackupPhase::Download,
                processed: report.summary.processed(),
            });
        }

        report.finished_at = self.config.clock.now();
        let summary = report.summary;
        info!(
            "Download phase complete: {} downloaded, {} skipped, {} failed of {}",
            summary.downloaded, summary.skipped, summary.failed, summary.total
        );
        for failure in &report.failures {
            warn!("Not backed up: {} ({})", failure.asset_id, failure.reason);
        }
        self.emit(BackupEvent::PhaseCompleted {
            run_id: run_id.to_string(),
            downloaded: summary.downloaded,
            skipped: summary.skipped,
            failed: summary.failed,
            total: summary.total,
        });

        match fatal {
            Some(source) => Err(BackupError::Aborted {
                report: Box::new(report),
                source: Box::new(source),
            }),
            None => Ok(report),
        }
    }

    /// Deletion phase.
    ///
    /// Only assets backed up in `report` whose local file is still valid are
    /// deleted; the rest are recorded as skipped. One asset's failure never
    /// stops the pass.
    ///
    /// # Errors
    ///
    /// [`BackupError::DeletionBlocked`] if `report` comes from a stopped or
    /// aborted run, or from a bounded run with failed downloads.
    #[instrument(skip(self, assets, report), fields(run_id = %report.run_id))]
    pub async fn delete_all(
        &self,
        assets: &[Arc<dyn RemoteAsset>],
        report: &DownloadReport,
    ) -> Result<DeletionReport> {
        if report.stopped {
            return Err(BackupError::DeletionBlocked(
                "the download phase was stopped".to_string(),
            ));
        }
        if let Some(reason) = &report.aborted {
            return Err(BackupError::DeletionBlocked(format!(
                "the download phase was aborted: {}",
                reason
            )));
        }
        if self.config.retry_mode.is_bounded() && report.has_failures() {
            return Err(BackupError::DeletionBlocked(format!(
                "{} assets failed to download",
                report.summary.failed
            )));
        }

        let run_id = report.run_id.to_string();
        let policy = RetryPolicy::for_deletes(&self.config);
        let mut deletion = DeletionReport::default();

        info!("Phase 2: Deleting {} remote originals", assets.len());
        self.emit(BackupEvent::PhaseStarted {
            run_id: run_id.clone(),
            phase: BackupPhase::Delete,
            total: assets.len() as u64,
        });

        for asset in assets {
            if self.cancel.is_cancelled() {
                deletion.stopped = true;
                break;
            }

            let outcome = match self.verified_copy(asset.as_ref(), report).await {
                Ok(()) => match self.delete_one(asset.as_ref(), &policy, &run_id).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        deletion.stopped = true;
                        break;
                    }
                },
                Err(reason) => {
                    debug!("Keeping remote original of {}: {}", asset.id(), reason);
                    DeletionOutcome::SkippedByPolicy { reason }
                }
            };
            deletion.record(asset.id(), outcome);
        }

        if deletion.stopped {
            info!("Stop requested during deletion phase");
            self.emit(BackupEvent::Stopped {
                run_id: run_id.clone(),
                phase: BackupPhase::Delete,
                processed: deletion.records.len() as u64,
            });
        }

        let summary = deletion.summary;
        if summary.is_degraded() {
            warn!(
                "Deletion phase degraded: {} deleted, {} skipped, {} failed",
                summary.deleted, summary.skipped, summary.failed
            );
        } else {
            info!("Deletion phase complete: {} deleted", summary.deleted);
        }
        self.emit(BackupEvent::DeletionCompleted {
            run_id,
            deleted: summary.deleted,
            skipped: summary.skipped,
            failed: summary.failed,
            degraded: summary.is_degraded(),
        });

        Ok(deletion)
    }

    /// Ok when `asset` has a backed-up record with a still valid file.
    async fn verified_copy(
        &self,
        asset: &dyn RemoteAsset,
        report: &DownloadReport,
    ) -> std::result::Result<(), String> {
        let record = report
            .find(asset.id())
            .ok_or_else(|| "asset was not part of the download phase".to_string())?;
        if !record.outcome.is_backed_up() {
            return Err("no verified local copy".to_string());
        }
        let destination = record
            .destination
            .as_deref()
            .ok_or_else(|| "no local destination".to_string())?;

        match self.store.is_valid(destination).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(format!(
                "local copy {} is missing or empty",
                destination.display()
            )),
            Err(e) => Err(format!("local copy could not be checked: {}", e)),
        }
    }

    /// Delete one original, retrying per `policy`.
    ///
    /// Returns `Err(Cancelled)` only when a stop interrupts a backoff wait.
    async fn delete_one(
        &self,
        asset: &dyn RemoteAsset,
        policy: &RetryPolicy,
        run_id: &str,
    ) -> Result<DeletionOutcome> {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let error = match asset.delete().await {
                Ok(()) => break,
                Err(e) if is_already_gone(&e) => {
                    debug!("{} was already deleted remotely", asset.id());
                    break;
                }
                Err(e) => BackupError::Remote(e),
            };

            match policy.classify(&error, attempt) {
                RetryDecision::RetryAfter(delay) => {
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Deleting {} failed, retrying: {}",
                        asset.id(),
                        error
                    );
                    self.emit(BackupEvent::RetryScheduled {
                        run_id: run_id.to_string(),
                        asset_id: asset.id().to_string(),
                        phase: BackupPhase::Delete,
                        attempt,
                        delay_ms: delay.as_millis() as u64,
                        reason: error.to_string(),
                    });

                    if !wait_or_stop(self.config.sleeper.as_ref(), &self.cancel, delay).await {
                        return Err(BackupError::Cancelled);
                    }
                }
                RetryDecision::NonRetryable => {
                    let retryable = classify_failure(&error).is_retryable();
                    let reason = error.classified().to_string();
                    error!("Could not delete {}: {}", asset.id(), reason);
                    self.emit(BackupEvent::DeletionFailed {
                        run_id: run_id.to_string(),
                        asset_id: asset.id().to_string(),
                        reason: reason.clone(),
                        retryable,
                    });

                    return Ok(if retryable {
                        DeletionOutcome::Failed { reason }
                    } else {
                        DeletionOutcome::SkippedByPolicy { reason }
                    });
                }
            }
        }

        self.emit(BackupEvent::AssetDeleted {
            run_id: run_id.to_string(),
            asset_id: asset.id().to_string(),
        });
        Ok(DeletionOutcome::Deleted)
    }

    fn emit(&self, event: BackupEvent) {
        self.event_bus.emit(CoreEvent::Backup(event)).ok();
    }
}

fn is_already_gone(error: &BridgeError) -> bool {
    matches!(error, BridgeError::NotFound(_)) || error.status() == Some(404)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::RunSummary;
    use chrono::Utc;

    fn report_with(failed: u64) -> DownloadReport {
        let mut report = DownloadReport::new(RunId::new(), failed + 1, Utc::now());
        report.summary = RunSummary {
            downloaded: 1,
            skipped: 0,
            failed,
            total: failed + 1,
        };
        report
    }

    #[tokio::test]
    async fn test_bool_decision() {
        let report = report_with(0);
        assert!(true.confirm(&report).await);
        assert!(!false.confirm(&report).await);
    }

    #[tokio::test]
    async fn test_closure_decision_sees_report() {
        let decision = |report: &DownloadReport| report.summary.downloaded > 0;
        assert!(decision.confirm(&report_with(0)).await);

        let decision: &dyn DeletionDecision = &|report: &DownloadReport| !report.has_failures();
        assert!(!decision.confirm(&report_with(2)).await);
    }

    #[test]
    fn test_already_gone() {
        assert!(is_already_gone(&BridgeError::NotFound("A".to_string())));
        assert!(is_already_gone(&BridgeError::Http {
            status: 404,
            message: "Not Found".to_string(),
        }));
        assert!(!is_already_gone(&BridgeError::PermissionDenied("A".to_string())));
    }
}
