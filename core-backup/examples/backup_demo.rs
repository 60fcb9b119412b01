//! Backup pipeline demonstration
//!
//! Signs in to an in-memory photo library (with a two-factor challenge),
//! backs it up into a temporary directory and optionally deletes the
//! "remote" originals. Some assets misbehave on purpose so retries and
//! failures show up in the logs.
//!
//! Run with:
//! ```bash
//! # Download only
//! cargo run -p core-backup --example backup_demo --features desktop-shims
//!
//! # Download, then delete the originals that were backed up
//! cargo run -p core-backup --example backup_demo --features desktop-shims -- --delete
//! ```
//!
//! Press Ctrl-C to stop after the current asset.

use anyhow::{Context, Result};
use async_trait::async_trait;
use bridge_traits::{
    error::Result as BridgeResult, AuthChallenge, BridgeError, Credentials, DownloadBody,
    PhotoService, RemoteAsset,
};
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use core_auth::AuthManager;
use core_backup::{BackupPipeline, DownloadReport};
use core_runtime::config::{BackoffConfig, BackupConfig, RetryMode};
use core_runtime::events::{BackupEvent, CoreEvent};
use core_runtime::logging::{init_logging, LoggingConfig};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

const DEMO_CODE: &str = "123456";

/// How a demo asset misbehaves.
#[derive(Clone, Copy)]
enum Behaviour {
    Healthy,
    /// Answers 503 this many times before serving the file
    Throttled(u32),
    /// Has been removed from the library
    Missing,
}

struct DemoAsset {
    id: String,
    filename: String,
    created: Option<DateTime<Utc>>,
    behaviour: Behaviour,
    failures: AtomicU32,
}

impl DemoAsset {
    fn new(id: &str, filename: &str, created: Option<DateTime<Utc>>, behaviour: Behaviour) -> Self {
        Self {
            id: id.to_string(),
            filename: filename.to_string(),
            created,
            behaviour,
            failures: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl RemoteAsset for DemoAsset {
    fn id(&self) -> &str {
        &self.id
    }

    fn filename(&self) -> &str {
        &self.filename
    }

    fn created(&self) -> Option<DateTime<Utc>> {
        self.created
    }

    async fn download(&self) -> BridgeResult<DownloadBody> {
        match self.behaviour {
            Behaviour::Missing => Err(BridgeError::NotFound(self.id.clone())),
            Behaviour::Throttled(times) if self.failures.fetch_add(1, Ordering::SeqCst) < times => {
                Err(BridgeError::Http {
                    status: 503,
                    message: "Service Unavailable".to_string(),
                })
            }
            _ => Ok(DownloadBody::from(Bytes::from(format!(
                "pixels of {}",
                self.filename
            )))),
        }
    }

    async fn delete(&self) -> BridgeResult<()> {
        info!("(remote) deleted {}", self.filename);
        Ok(())
    }
}

struct DemoLibrary {
    assets: Vec<Arc<dyn RemoteAsset>>,
}

#[async_trait]
impl PhotoService for DemoLibrary {
    async fn authenticate(&self, credentials: &Credentials) -> BridgeResult<AuthChallenge> {
        if credentials.password.is_empty() {
            return Err(BridgeError::PermissionDenied("empty password".to_string()));
        }
        Ok(AuthChallenge::TwoFactorRequired)
    }

    async fn submit_two_factor_code(&self, code: &str) -> BridgeResult<bool> {
        Ok(code == DEMO_CODE)
    }

    async fn list_assets(&self) -> BridgeResult<Vec<Arc<dyn RemoteAsset>>> {
        Ok(self.assets.clone())
    }
}

fn demo_library() -> DemoLibrary {
    let march = Utc.with_ymd_and_hms(2023, 3, 15, 10, 30, 0).single();
    let summer = Utc.with_ymd_and_hms(2022, 7, 2, 18, 0, 0).single();
    let assets: Vec<Arc<dyn RemoteAsset>> = vec![
        Arc::new(DemoAsset::new("A1", "IMG_0001.JPG", march, Behaviour::Healthy)),
        Arc::new(DemoAsset::new("A2", "clip.MOV", march, Behaviour::Throttled(2))),
        Arc::new(DemoAsset::new("A3", "beach.heic", summer, Behaviour::Healthy)),
        Arc::new(DemoAsset::new("A4", "scan.png", None, Behaviour::Healthy)),
        Arc::new(DemoAsset::new("A5", "lost.jpg", summer, Behaviour::Missing)),
    ];

    DemoLibrary { assets }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging(LoggingConfig::default()).context("Failed to initialize logging")?;

    let delete = std::env::args().any(|arg| arg == "--delete");
    let destination = std::env::temp_dir().join(format!("photo-vault-demo-{}", Uuid::new_v4()));

    // Short waits so the demo finishes quickly.
    let backoff = BackoffConfig::downloads()
        .with_rate_limit_unit(Duration::from_millis(500))
        .with_transient_delay(Duration::from_millis(500))
        .with_fallback_delay(Duration::from_millis(500));
    let config = BackupConfig::builder()
        .destination(&destination)
        .retry_mode(RetryMode::Unbounded)
        .download_backoff(backoff)
        .delete_backoff(backoff)
        .event_buffer_size(512)
        .build()
        .context("Invalid backup configuration")?;

    let pipeline = BackupPipeline::from_config(config);
    let event_bus = pipeline.event_bus().clone();

    // Sign in, answering the challenge with the demo code.
    let service: Arc<dyn PhotoService> = Arc::new(demo_library());
    let auth = AuthManager::new(service, event_bus.clone());
    let prompt = |attempt: u32| {
        info!("Two-factor code requested (attempt {})", attempt);
        Some(DEMO_CODE.to_string())
    };
    let session = auth
        .sign_in(&Credentials::new("demo@example.com", "demo-password"), &prompt)
        .await
        .context("Sign-in failed")?;
    info!("Signed in as {}", session.account);

    let stop = pipeline.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, stopping after the current asset");
            stop.cancel();
        }
    });

    let mut events = event_bus.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let CoreEvent::Backup(BackupEvent::Progress {
                processed, total, ..
            }) = &event
            {
                info!("Progress: {}/{}", processed, total);
            }
        }
    });

    let library = auth.authenticated_service().await?;
    let decision = move |report: &DownloadReport| {
        info!(
            "{} of {} assets backed up",
            report.summary.downloaded + report.summary.skipped,
            report.summary.total
        );
        delete
    };
    let report = match pipeline.execute(library.as_ref(), &decision).await {
        Ok(report) => report,
        Err(e) => {
            if let Some(partial) = e.partial_report() {
                warn!(
                    "Backup aborted with {} of {} assets processed",
                    partial.summary.processed(),
                    partial.summary.total
                );
            }
            return Err(e.into());
        }
    };

    info!("Deletion gate: {:?}", report.gate);
    for failure in &report.download.failures {
        warn!("Failed: {} ({})", failure.asset_id, failure.reason);
    }
    if let Some(deletion) = &report.deletion {
        info!(
            "Deleted {} originals ({} kept)",
            deletion.summary.deleted,
            deletion.summary.skipped + deletion.summary.failed
        );
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&report.download.summary)?
    );
    info!("Backup written to {}", destination.display());

    printer.abort();
    Ok(())
}
