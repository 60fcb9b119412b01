//! Run identifiers, per-asset outcomes and the reports handed back to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    /// Create a new random run ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RunId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ============================================================================
// Download Phase
// ============================================================================

/// Terminal result of transferring one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TransferOutcome {
    /// A valid file was already at the destination
    Skipped,
    /// The asset was downloaded and verified
    Downloaded { bytes: u64 },
    /// Given up on; the reason names the last error
    Failed { reason: String },
}

impl TransferOutcome {
    /// Whether a valid local copy exists after this outcome.
    pub fn is_backed_up(&self) -> bool {
        matches!(
            self,
            TransferOutcome::Skipped | TransferOutcome::Downloaded { .. }
        )
    }
}

/// Download phase counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub downloaded: u64,
    pub skipped: u64,
    pub failed: u64,
    /// Number of listed assets
    pub total: u64,
}

impl RunSummary {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn record(&mut self, outcome: &TransferOutcome) {
        match outcome {
            TransferOutcome::Skipped => self.skipped += 1,
            TransferOutcome::Downloaded { .. } => self.downloaded += 1,
            TransferOutcome::Failed { .. } => self.failed += 1,
        }
    }

    /// Assets with a terminal outcome so far
    pub fn processed(&self) -> u64 {
        self.downloaded + self.skipped + self.failed
    }
}

/// What happened to one asset during the download phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub asset_id: String,
    pub filename: String,
    /// `None` when no destination could be planned
    pub destination: Option<PathBuf>,
    pub outcome: TransferOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetFailure {
    pub asset_id: String,
    pub reason: String,
}

/// Result of the download phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadReport {
    pub run_id: RunId,
    pub summary: RunSummary,
    /// One record per processed asset, in listing order
    pub records: Vec<AssetRecord>,
    pub failures: Vec<AssetFailure>,
    /// True if the run was stopped before every asset was processed
    pub stopped: bool,
    /// Set when an unwritable destination ended the phase early
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
    /// Destinations planned for more than one asset, once per extra asset
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shared_destinations: Vec<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl DownloadReport {
    pub fn new(run_id: RunId, total: u64, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            summary: RunSummary::new(total),
            records: Vec::new(),
            failures: Vec::new(),
            stopped: false,
            aborted: None,
            shared_destinations: Vec::new(),
            started_at,
            finished_at: started_at,
        }
    }

    /// Add the outcome of one asset.
    pub fn record(&mut self, record: AssetRecord) {
        self.summary.record(&record.outcome);
        if let TransferOutcome::Failed { reason } = &record.outcome {
            self.failures.push(AssetFailure {
                asset_id: record.asset_id.clone(),
                reason: reason.clone(),
            });
        }
        self.records.push(record);
    }

    /// Record for `asset_id`; the first one wins if an id repeats.
    pub fn find(&self, asset_id: &str) -> Option<&AssetRecord> {
        self.records.iter().find(|r| r.asset_id == asset_id)
    }

    pub fn has_failures(&self) -> bool {
        self.summary.failed > 0
    }
}

// ============================================================================
// Deletion Phase
// ============================================================================

/// Terminal result of deleting one remote original.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeletionOutcome {
    Deleted,
    /// Not attempted, or refused by the remote for good
    SkippedByPolicy { reason: String },
    /// Retries ran out
    Failed { reason: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionSummary {
    pub deleted: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl DeletionSummary {
    pub fn record(&mut self, outcome: &DeletionOutcome) {
        match outcome {
            DeletionOutcome::Deleted => self.deleted += 1,
            DeletionOutcome::SkippedByPolicy { .. } => self.skipped += 1,
            DeletionOutcome::Failed { .. } => self.failed += 1,
        }
    }

    /// True when at least one original was left on the remote.
    pub fn is_degraded(&self) -> bool {
        self.skipped + self.failed > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionRecord {
    pub asset_id: String,
    pub outcome: DeletionOutcome,
}

/// Result of the deletion phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionReport {
    pub summary: DeletionSummary,
    pub records: Vec<DeletionRecord>,
    pub stopped: bool,
}

impl DeletionReport {
    pub fn record(&mut self, asset_id: &str, outcome: DeletionOutcome) {
        self.summary.record(&outcome);
        self.records.push(DeletionRecord {
            asset_id: asset_id.to_string(),
            outcome,
        });
    }

    pub fn outcome_of(&self, asset_id: &str) -> Option<&DeletionOutcome> {
        self.records
            .iter()
            .find(|r| r.asset_id == asset_id)
            .map(|r| &r.outcome)
    }
}

// ============================================================================
// Whole Run
// ============================================================================

/// Why the deletion phase did or did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "gate", rename_all = "snake_case")]
pub enum DeletionGate {
    /// The caller said no
    Declined,
    /// Bounded mode with failed downloads; the caller was not asked
    BlockedByFailures { failed: u64 },
    /// The run was stopped during the download phase
    Stopped,
    /// No asset had a verified local copy
    NothingToDelete,
    /// The caller said yes and the deletion phase ran
    Confirmed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub download: DownloadReport,
    pub deletion: Option<DeletionReport>,
    pub gate: DeletionGate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_display() {
        let uuid = Uuid::new_v4();
        let id = RunId::from(uuid);
        assert_eq!(id.to_string(), uuid.to_string());
        assert_ne!(RunId::new(), RunId::new());
    }

    #[test]
    fn test_download_report_counts() {
        let mut report = DownloadReport::new(RunId::new(), 3, Utc::now());
        for (id, outcome) in [
            ("A", TransferOutcome::Downloaded { bytes: 10 }),
            ("B", TransferOutcome::Skipped),
            (
                "C",
                TransferOutcome::Failed {
                    reason: "gone".to_string(),
                },
            ),
        ] {
            report.record(AssetRecord {
                asset_id: id.to_string(),
                filename: format!("{id}.jpg"),
                destination: None,
                outcome,
            });
        }

        assert_eq!(
            report.summary,
            RunSummary {
                downloaded: 1,
                skipped: 1,
                failed: 1,
                total: 3
            }
        );
        assert_eq!(report.summary.processed(), 3);
        assert!(report.has_failures());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].asset_id, "C");
        assert!(report.find("B").unwrap().outcome.is_backed_up());
        assert!(!report.find("C").unwrap().outcome.is_backed_up());
        assert!(report.find("Z").is_none());
    }

    #[test]
    fn test_deletion_degraded() {
        let mut report = DeletionReport::default();
        report.record("A", DeletionOutcome::Deleted);
        assert!(!report.summary.is_degraded());

        report.record(
            "B",
            DeletionOutcome::SkippedByPolicy {
                reason: "permission denied".to_string(),
            },
        );
        assert!(report.summary.is_degraded());
        assert_eq!(report.outcome_of("A"), Some(&DeletionOutcome::Deleted));
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(TransferOutcome::Downloaded { bytes: 5 }).unwrap();
        assert_eq!(json["outcome"], "downloaded");
        assert_eq!(json["bytes"], 5);

        let gate = serde_json::to_value(DeletionGate::BlockedByFailures { failed: 2 }).unwrap();
        assert_eq!(gate["gate"], "blocked_by_failures");
    }
}
