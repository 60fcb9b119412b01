//! Integration tests for the deletion gate and deletion phase
//!
//! Every test checks the same rule from a different angle: a remote original
//! is deleted only when a valid local copy exists.

mod common;

use bridge_traits::BridgeError;
use common::*;
use core_backup::{
    BackupError, BackupPipeline, DeletionGate, DeletionOutcome, DownloadReport, TransferOutcome,
};
use core_runtime::config::RetryMode;
use core_runtime::events::{BackupEvent, EventBus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn service_with(assets: &[Arc<FakeAsset>]) -> MockService {
    let listed = listing(assets);
    let mut service = MockService::new();
    service
        .expect_list_assets()
        .times(1)
        .returning(move || Ok(listed.clone()));
    service
}

#[tokio::test]
async fn test_confirmed_run_deletes_backed_up_originals() {
    let dir = temp_dir();
    let sleeper = Arc::new(RecordingSleeper::default());
    let pipeline = BackupPipeline::new(
        config(&dir, RetryMode::default(), sleeper),
        EventBus::new(1024),
    );
    let assets = vec![
        Arc::new(FakeAsset::new("A1", "a.jpg")),
        Arc::new(FakeAsset::new("A2", "b.mov")),
    ];
    let service = service_with(&assets);

    let report = pipeline.execute(&service, &true).await.unwrap();

    assert_eq!(report.gate, DeletionGate::Confirmed);
    let deletion = report.deletion.unwrap();
    assert_eq!(deletion.summary.deleted, 2);
    assert!(!deletion.summary.is_degraded());
    assert!(assets.iter().all(|asset| asset.delete_calls() == 1));
    assert!(dir.join("2023/03/Foto/a.jpg").is_file());
    assert!(dir.join("2023/03/Video/b.mov").is_file());

    cleanup(&dir).await;
}

#[tokio::test]
async fn test_declined_run_deletes_nothing() {
    let dir = temp_dir();
    let sleeper = Arc::new(RecordingSleeper::default());
    let pipeline = BackupPipeline::new(
        config(&dir, RetryMode::default(), sleeper),
        EventBus::new(1024),
    );
    let assets = vec![Arc::new(FakeAsset::new("A1", "a.jpg"))];
    let service = service_with(&assets);

    let report = pipeline.execute(&service, &false).await.unwrap();

    assert_eq!(report.gate, DeletionGate::Declined);
    assert!(report.deletion.is_none());
    assert_eq!(assets[0].delete_calls(), 0);

    cleanup(&dir).await;
}

#[tokio::test]
async fn test_bounded_failures_block_deletion_without_asking() {
    let dir = temp_dir();
    let sleeper = Arc::new(RecordingSleeper::default());
    let pipeline = BackupPipeline::new(
        config(&dir, RetryMode::Bounded { max_attempts: 2 }, sleeper),
        EventBus::new(1024),
    );
    let assets = vec![
        Arc::new(FakeAsset::new("A1", "a.jpg")),
        Arc::new(
            FakeAsset::new("A2", "b.jpg")
                .then_download_error(service_unavailable())
                .then_download_error(service_unavailable()),
        ),
    ];
    let service = service_with(&assets);
    let asked = AtomicBool::new(false);
    let decision = |_: &DownloadReport| {
        asked.store(true, Ordering::SeqCst);
        true
    };

    let report = pipeline.execute(&service, &decision).await.unwrap();

    assert_eq!(report.gate, DeletionGate::BlockedByFailures { failed: 1 });
    assert!(!asked.load(Ordering::SeqCst));
    assert!(assets.iter().all(|asset| asset.delete_calls() == 0));

    let err = pipeline
        .delete_all(&listing(&assets), &report.download)
        .await
        .unwrap_err();
    assert!(matches!(err, BackupError::DeletionBlocked(_)));
    assert!(assets.iter().all(|asset| asset.delete_calls() == 0));

    cleanup(&dir).await;
}

#[tokio::test]
async fn test_unbounded_mode_never_deletes_unbacked_assets() {
    let dir = temp_dir();
    let sleeper = Arc::new(RecordingSleeper::default());
    let pipeline = BackupPipeline::new(
        config(&dir, RetryMode::Unbounded, sleeper),
        EventBus::new(1024),
    );
    let gone = Arc::new(
        FakeAsset::new("A1", "a.jpg")
            .then_download_error(BridgeError::NotFound("A1".to_string())),
    );
    let fine = Arc::new(FakeAsset::new("A2", "b.jpg"));
    let service = service_with(&[gone.clone(), fine.clone()]);

    let report = pipeline.execute(&service, &true).await.unwrap();

    assert!(matches!(
        report.download.records[0].outcome,
        TransferOutcome::Failed { .. }
    ));
    assert_eq!(report.gate, DeletionGate::Confirmed);
    let deletion = report.deletion.unwrap();
    assert!(matches!(
        deletion.outcome_of("A1"),
        Some(DeletionOutcome::SkippedByPolicy { .. })
    ));
    assert_eq!(deletion.outcome_of("A2"), Some(&DeletionOutcome::Deleted));
    assert_eq!(gone.delete_calls(), 0);
    assert_eq!(fine.delete_calls(), 1);
    assert!(deletion.summary.is_degraded());

    cleanup(&dir).await;
}

#[tokio::test]
async fn test_local_copy_removed_before_deletion_is_kept_remotely() {
    let dir = temp_dir();
    let sleeper = Arc::new(RecordingSleeper::default());
    let pipeline = BackupPipeline::new(
        config(&dir, RetryMode::default(), sleeper),
        EventBus::new(1024),
    );
    let asset = Arc::new(FakeAsset::new("A1", "a.jpg"));
    let assets = listing(&[asset.clone()]);

    let download = pipeline.run(&assets).await.unwrap();
    tokio::fs::write(dir.join("2023/03/Foto/a.jpg"), b"").await.unwrap();
    let deletion = pipeline.delete_all(&assets, &download).await.unwrap();

    assert_eq!(deletion.summary.skipped, 1);
    assert_eq!(asset.delete_calls(), 0);

    cleanup(&dir).await;
}

#[tokio::test]
async fn test_permission_error_short_circuits() {
    let dir = temp_dir();
    let sleeper = Arc::new(RecordingSleeper::default());
    let bus = EventBus::new(1024);
    let pipeline = BackupPipeline::new(
        config(&dir, RetryMode::default(), sleeper.clone()),
        bus.clone(),
    );
    let refused = Arc::new(
        FakeAsset::new("A1", "a.jpg")
            .then_delete_error(BridgeError::PermissionDenied("shared album".to_string())),
    );
    let next = Arc::new(FakeAsset::new("A2", "b.jpg"));
    let assets = listing(&[refused.clone(), next.clone()]);
    let download = pipeline.run(&assets).await.unwrap();
    let mut events = bus.stream();

    let deletion = pipeline.delete_all(&assets, &download).await.unwrap();

    assert_eq!(refused.delete_calls(), 1);
    assert_eq!(next.delete_calls(), 1);
    assert!(sleeper.waits().is_empty());
    assert!(matches!(
        deletion.outcome_of("A1"),
        Some(DeletionOutcome::SkippedByPolicy { .. })
    ));
    assert_eq!(deletion.outcome_of("A2"), Some(&DeletionOutcome::Deleted));

    let events = backup_events(&mut events);
    assert!(events.iter().any(|event| matches!(
        event,
        BackupEvent::DeletionFailed { asset_id, retryable: false, .. } if asset_id == "A1"
    )));
    assert!(events.iter().any(|event| matches!(
        event,
        BackupEvent::DeletionCompleted { deleted: 1, skipped: 1, degraded: true, .. }
    )));

    cleanup(&dir).await;
}

#[tokio::test]
async fn test_delete_retries_use_delete_backoff() {
    let dir = temp_dir();
    let sleeper = Arc::new(RecordingSleeper::default());
    let pipeline = BackupPipeline::new(
        config(&dir, RetryMode::default(), sleeper.clone()),
        EventBus::new(1024),
    );
    let asset = Arc::new(
        FakeAsset::new("A1", "a.jpg")
            .then_delete_error(service_unavailable())
            .then_delete_error(service_unavailable())
            .then_delete_error(BridgeError::Timeout("delete".to_string())),
    );
    let assets = listing(&[asset.clone()]);
    let download = pipeline.run(&assets).await.unwrap();

    let deletion = pipeline.delete_all(&assets, &download).await.unwrap();

    assert_eq!(deletion.summary.deleted, 1);
    assert_eq!(asset.delete_calls(), 4);
    assert_eq!(
        sleeper.waits(),
        vec![
            Duration::from_secs(10),
            Duration::from_secs(20),
            Duration::from_secs(10)
        ]
    );

    cleanup(&dir).await;
}

#[tokio::test]
async fn test_exhausted_delete_retries_are_reported() {
    let dir = temp_dir();
    let sleeper = Arc::new(RecordingSleeper::default());
    let pipeline = BackupPipeline::new(
        config(&dir, RetryMode::Bounded { max_attempts: 2 }, sleeper),
        EventBus::new(1024),
    );
    let asset = Arc::new(
        FakeAsset::new("A1", "a.jpg")
            .then_delete_error(service_unavailable())
            .then_delete_error(service_unavailable()),
    );
    let assets = listing(&[asset.clone()]);
    let download = pipeline.run(&assets).await.unwrap();

    let deletion = pipeline.delete_all(&assets, &download).await.unwrap();

    assert_eq!(deletion.summary.failed, 1);
    assert!(deletion.summary.is_degraded());
    assert!(matches!(
        deletion.outcome_of("A1"),
        Some(DeletionOutcome::Failed { reason }) if reason.contains("Rate limited")
    ));

    cleanup(&dir).await;
}

#[tokio::test]
async fn test_already_deleted_asset_counts_as_deleted() {
    let dir = temp_dir();
    let sleeper = Arc::new(RecordingSleeper::default());
    let pipeline = BackupPipeline::new(
        config(&dir, RetryMode::default(), sleeper),
        EventBus::new(1024),
    );
    let asset = Arc::new(
        FakeAsset::new("A1", "a.jpg").then_delete_error(BridgeError::NotFound("A1".to_string())),
    );
    let assets = listing(&[asset.clone()]);
    let download = pipeline.run(&assets).await.unwrap();

    let deletion = pipeline.delete_all(&assets, &download).await.unwrap();

    assert_eq!(deletion.outcome_of("A1"), Some(&DeletionOutcome::Deleted));
    assert_eq!(asset.delete_calls(), 1);

    cleanup(&dir).await;
}

#[tokio::test]
async fn test_stopped_run_never_deletes() {
    let dir = temp_dir();
    let sleeper = Arc::new(RecordingSleeper::default());
    let pipeline = BackupPipeline::new(
        config(&dir, RetryMode::Unbounded, sleeper),
        EventBus::new(1024),
    );
    let first = Arc::new(FakeAsset::new("A1", "a.jpg").stop_on_download(pipeline.stop_handle()));
    let second = Arc::new(FakeAsset::new("A2", "b.jpg"));
    let service = service_with(&[first.clone(), second.clone()]);

    let report = pipeline.execute(&service, &true).await.unwrap();

    assert_eq!(report.gate, DeletionGate::Stopped);
    assert!(report.deletion.is_none());
    assert_eq!(first.delete_calls(), 0);

    cleanup(&dir).await;
}

#[tokio::test]
async fn test_empty_library_has_nothing_to_delete() {
    let dir = temp_dir();
    let sleeper = Arc::new(RecordingSleeper::default());
    let pipeline = BackupPipeline::new(
        config(&dir, RetryMode::default(), sleeper),
        EventBus::new(1024),
    );
    let service = service_with(&[]);

    let report = pipeline.execute(&service, &true).await.unwrap();

    assert_eq!(report.gate, DeletionGate::NothingToDelete);
    assert_eq!(report.download.summary.total, 0);

    cleanup(&dir).await;
}

#[tokio::test]
async fn test_aborted_report_blocks_deletion() {
    let dir = temp_dir();
    let sleeper = Arc::new(RecordingSleeper::default());
    let pipeline = BackupPipeline::new(
        config(&dir, RetryMode::Unbounded, sleeper),
        EventBus::new(1024),
    );
    let assets = vec![Arc::new(FakeAsset::new("A1", "a.jpg"))];
    let mut report = pipeline.run(&listing(&assets)).await.unwrap();
    report.aborted = Some("no space left on device".to_string());

    let err = pipeline
        .delete_all(&listing(&assets), &report)
        .await
        .unwrap_err();

    assert!(matches!(err, BackupError::DeletionBlocked(_)));
    assert_eq!(assets[0].delete_calls(), 0);

    cleanup(&dir).await;
}

#[tokio::test]
async fn test_listing_failure_is_reported() {
    let dir = temp_dir();
    let sleeper = Arc::new(RecordingSleeper::default());
    let pipeline = BackupPipeline::new(
        config(&dir, RetryMode::default(), sleeper),
        EventBus::new(1024),
    );
    let mut service = MockService::new();
    service
        .expect_list_assets()
        .times(1)
        .returning(|| Err(BridgeError::Network("offline".to_string())));

    let err = pipeline.execute(&service, &true).await.unwrap_err();

    assert!(matches!(err, BackupError::Listing(BridgeError::Network(_))));
}
