//! Shared fakes for the backup integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_desktop::TokioFileSystem;
use bridge_traits::{
    error::Result as BridgeResult, AuthChallenge, BridgeError, Credentials, DownloadBody,
    PhotoService, RemoteAsset, Sleeper,
};
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use core_runtime::config::{BackupConfig, RetryMode};
use core_runtime::events::{BackupEvent, CoreEvent, EventStream};
use mockall::mock;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

// ============================================================================
// Mock Implementations
// ============================================================================

mock! {
    pub Service {}

    #[async_trait]
    impl PhotoService for Service {
        async fn authenticate(&self, credentials: &Credentials) -> BridgeResult<AuthChallenge>;
        async fn submit_two_factor_code(&self, code: &str) -> BridgeResult<bool>;
        async fn list_assets(&self) -> BridgeResult<Vec<Arc<dyn RemoteAsset>>>;
    }
}

/// Remote asset whose downloads and deletes follow a script.
///
/// Once the download script is exhausted every download returns `content`;
/// once the delete script is exhausted every delete succeeds.
pub struct FakeAsset {
    id: String,
    filename: String,
    created: Option<DateTime<Utc>>,
    content: Bytes,
    size_hint: Option<u64>,
    downloads: Mutex<VecDeque<BridgeResult<DownloadBody>>>,
    deletes: Mutex<VecDeque<BridgeResult<()>>>,
    stop_on_download: Option<CancellationToken>,
    download_calls: AtomicU32,
    delete_calls: AtomicU32,
}

impl FakeAsset {
    pub fn new(id: &str, filename: &str) -> Self {
        Self {
            id: id.to_string(),
            filename: filename.to_string(),
            created: Some(Utc.with_ymd_and_hms(2023, 3, 15, 10, 30, 0).unwrap()),
            content: Bytes::from(format!("content of {id}")),
            size_hint: None,
            downloads: Mutex::new(VecDeque::new()),
            deletes: Mutex::new(VecDeque::new()),
            stop_on_download: None,
            download_calls: AtomicU32::new(0),
            delete_calls: AtomicU32::new(0),
        }
    }

    pub fn taken_at(mut self, created: Option<DateTime<Utc>>) -> Self {
        self.created = created;
        self
    }

    pub fn content(mut self, content: &'static [u8]) -> Self {
        self.content = Bytes::from_static(content);
        self
    }

    /// Size the remote reports for the asset.
    pub fn reported_size(mut self, size: u64) -> Self {
        self.size_hint = Some(size);
        self
    }

    pub fn then_download(self, body: BridgeResult<DownloadBody>) -> Self {
        self.downloads.lock().unwrap().push_back(body);
        self
    }

    pub fn then_download_error(self, error: BridgeError) -> Self {
        self.then_download(Err(error))
    }

    pub fn then_delete_error(self, error: BridgeError) -> Self {
        self.deletes.lock().unwrap().push_back(Err(error));
        self
    }

    /// Cancel `token` whenever this asset is downloaded.
    pub fn stop_on_download(mut self, token: CancellationToken) -> Self {
        self.stop_on_download = Some(token);
        self
    }

    pub fn expected_content(&self) -> &[u8] {
        &self.content
    }

    pub fn download_calls(&self) -> u32 {
        self.download_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> u32 {
        self.delete_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteAsset for FakeAsset {
    fn id(&self) -> &str {
        &self.id
    }

    fn filename(&self) -> &str {
        &self.filename
    }

    fn created(&self) -> Option<DateTime<Utc>> {
        self.created
    }

    fn size_hint(&self) -> Option<u64> {
        self.size_hint
    }

    async fn download(&self) -> BridgeResult<DownloadBody> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(token) = &self.stop_on_download {
            token.cancel();
        }
        let scripted = self.downloads.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(DownloadBody::from(self.content.clone())))
    }

    async fn delete(&self) -> BridgeResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.deletes.lock().unwrap().pop_front();
        scripted.unwrap_or(Ok(()))
    }
}

/// Sleeper that returns immediately and remembers every requested wait.
#[derive(Default)]
pub struct RecordingSleeper {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.waits.lock().unwrap().push(duration);
    }
}

// ============================================================================
// Helpers
// ============================================================================

pub fn temp_dir() -> PathBuf {
    std::env::temp_dir().join(format!("core-backup-it-{}", Uuid::new_v4()))
}

pub async fn cleanup(dir: &Path) {
    tokio::fs::remove_dir_all(dir).await.ok();
}

pub fn config(dir: &Path, mode: RetryMode, sleeper: Arc<RecordingSleeper>) -> BackupConfig {
    BackupConfig::builder()
        .destination(dir)
        .retry_mode(mode)
        .file_system(Arc::new(TokioFileSystem::new()))
        .sleeper(sleeper)
        .build()
        .unwrap()
}

pub fn listing(assets: &[Arc<FakeAsset>]) -> Vec<Arc<dyn RemoteAsset>> {
    assets
        .iter()
        .map(|asset| asset.clone() as Arc<dyn RemoteAsset>)
        .collect()
}

pub fn service_unavailable() -> BridgeError {
    BridgeError::Http {
        status: 503,
        message: "Service Unavailable".to_string(),
    }
}

pub fn backup_events(stream: &mut EventStream) -> Vec<BackupEvent> {
    stream
        .drain()
        .into_iter()
        .filter_map(|event| match event {
            CoreEvent::Backup(event) => Some(event),
            _ => None,
        })
        .collect()
}
