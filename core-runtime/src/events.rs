//! # Events
//!
//! Typed notifications leaving the core over a `tokio::sync::broadcast`
//! channel. Sign-in and the backup pipeline publish; hosts subscribe and
//! render them however they like (progress bar, log file, notification).
//!
//! ```text
//!  core-auth ──┐                      ┌──> progress UI
//!              ├──emit──> EventBus ───┤
//! core-backup ─┘                      └──> run log
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{BackupEvent, BackupPhase, CoreEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(256);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Backup(BackupEvent::PhaseStarted {
//!         run_id: "run-1".to_string(),
//!         phase: BackupPhase::Download,
//!         total: 3,
//!     }))
//!     .ok();
//!
//! let event = stream.recv().await.unwrap();
//! println!("{}", event.description());
//! # }
//! ```
//!
//! A subscriber that falls more than the buffer size behind gets
//! `RecvError::Lagged(n)` once and then continues with newer events.
//! `RecvError::Closed` means every publisher is gone.
//!
//! Emitting with no subscribers returns an error which publishers ignore:
//! the pipeline never depends on anyone listening.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Capacity used by [`EventBus::default`].
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = crate::config::DEFAULT_EVENT_BUFFER_SIZE;

/// Anything the core publishes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Sign-in and two-factor events
    Auth(AuthEvent),
    /// Download and deletion pipeline events
    Backup(BackupEvent),
}

impl CoreEvent {
    /// Short English label, suitable for a status line.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Auth(e) => e.description(),
            CoreEvent::Backup(e) => e.description(),
        }
    }

    /// How loudly a host should surface the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Auth(AuthEvent::AuthError { .. }) => EventSeverity::Error,
            CoreEvent::Backup(BackupEvent::AssetFailed { .. }) => EventSeverity::Error,
            CoreEvent::Backup(BackupEvent::DeletionFailed { .. }) => EventSeverity::Error,
            CoreEvent::Backup(BackupEvent::RetryScheduled { .. }) => EventSeverity::Warning,
            CoreEvent::Backup(BackupEvent::Stopped { .. }) => EventSeverity::Warning,
            CoreEvent::Backup(BackupEvent::DeletionCompleted { degraded: true, .. }) => {
                EventSeverity::Warning
            }
            CoreEvent::Auth(AuthEvent::SignedIn { .. })
            | CoreEvent::Backup(BackupEvent::PhaseStarted { .. })
            | CoreEvent::Backup(BackupEvent::PhaseCompleted { .. })
            | CoreEvent::Backup(BackupEvent::DeletionCompleted { .. }) => EventSeverity::Info,
            CoreEvent::Auth(_) | CoreEvent::Backup(_) => EventSeverity::Debug,
        }
    }
}

/// Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Sign-in lifecycle events.
///
/// Usernames are redacted before they are placed in an event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AuthEvent {
    SigningIn {
        account: String,
    },
    TwoFactorRequired {
        account: String,
    },
    TwoFactorRejected {
        account: String,
    },
    SignedIn {
        account: String,
        two_factor: bool,
    },
    AuthError {
        account: Option<String>,
        message: String,
        recoverable: bool,
    },
}

impl AuthEvent {
    fn description(&self) -> &str {
        match self {
            AuthEvent::SigningIn { .. } => "Signing in",
            AuthEvent::TwoFactorRequired { .. } => "Two-factor code required",
            AuthEvent::TwoFactorRejected { .. } => "Two-factor code rejected",
            AuthEvent::SignedIn { .. } => "Signed in",
            AuthEvent::AuthError { .. } => "Sign-in failed",
        }
    }
}

/// Pipeline phase an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupPhase {
    Download,
    Delete,
}

impl fmt::Display for BackupPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupPhase::Download => f.write_str("download"),
            BackupPhase::Delete => f.write_str("delete"),
        }
    }
}

/// Download and deletion progress events.
///
/// Every event carries the `run_id` of the pipeline run that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum BackupEvent {
    PhaseStarted {
        run_id: String,
        phase: BackupPhase,
        total: u64,
    },
    AssetStarted {
        run_id: String,
        asset_id: String,
        filename: String,
        /// 1-based position in the listing
        index: u64,
        total: u64,
    },
    AssetSkipped {
        run_id: String,
        asset_id: String,
        destination: String,
    },
    AssetDownloaded {
        run_id: String,
        asset_id: String,
        destination: String,
        bytes: u64,
    },
    AssetFailed {
        run_id: String,
        asset_id: String,
        reason: String,
    },
    RetryScheduled {
        run_id: String,
        asset_id: String,
        phase: BackupPhase,
        /// Attempt that just failed, starting at 1
        attempt: u32,
        delay_ms: u64,
        reason: String,
    },
    Progress {
        run_id: String,
        processed: u64,
        total: u64,
        downloaded: u64,
        skipped: u64,
        failed: u64,
    },
    PhaseCompleted {
        run_id: String,
        downloaded: u64,
        skipped: u64,
        failed: u64,
        total: u64,
    },
    AssetDeleted {
        run_id: String,
        asset_id: String,
    },
    DeletionFailed {
        run_id: String,
        asset_id: String,
        reason: String,
        /// False when the remote refused outright; true when retries ran out
        retryable: bool,
    },
    DeletionCompleted {
        run_id: String,
        deleted: u64,
        skipped: u64,
        failed: u64,
        degraded: bool,
    },
    Stopped {
        run_id: String,
        phase: BackupPhase,
        processed: u64,
    },
}

impl BackupEvent {
    fn description(&self) -> &str {
        match self {
            BackupEvent::PhaseStarted { .. } => "Backup phase started",
            BackupEvent::AssetStarted { .. } => "Processing asset",
            BackupEvent::AssetSkipped { .. } => "Asset already backed up",
            BackupEvent::AssetDownloaded { .. } => "Asset downloaded",
            BackupEvent::AssetFailed { .. } => "Asset download failed",
            BackupEvent::RetryScheduled { .. } => "Retry scheduled",
            BackupEvent::Progress { .. } => "Backup in progress",
            BackupEvent::PhaseCompleted { .. } => "Download phase completed",
            BackupEvent::AssetDeleted { .. } => "Remote original deleted",
            BackupEvent::DeletionFailed { .. } => "Remote deletion failed",
            BackupEvent::DeletionCompleted { .. } => "Deletion phase completed",
            BackupEvent::Stopped { .. } => "Backup stopped",
        }
    }

    /// Run the event belongs to.
    pub fn run_id(&self) -> &str {
        match self {
            BackupEvent::PhaseStarted { run_id, .. }
            | BackupEvent::AssetStarted { run_id, .. }
            | BackupEvent::AssetSkipped { run_id, .. }
            | BackupEvent::AssetDownloaded { run_id, .. }
            | BackupEvent::AssetFailed { run_id, .. }
            | BackupEvent::RetryScheduled { run_id, .. }
            | BackupEvent::Progress { run_id, .. }
            | BackupEvent::PhaseCompleted { run_id, .. }
            | BackupEvent::AssetDeleted { run_id, .. }
            | BackupEvent::DeletionFailed { run_id, .. }
            | BackupEvent::DeletionCompleted { run_id, .. }
            | BackupEvent::Stopped { run_id, .. } => run_id,
        }
    }
}

/// Central event bus for publishing and subscribing to core events.
///
/// Cloning is cheap; all clones publish into the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus holding up to `capacity` undelivered events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emits an event to all current subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscription. Only events emitted afterwards are seen.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Creates a filtered-capable [`EventStream`] subscription.
    pub fn stream(&self) -> EventStream {
        EventStream::new(self.subscribe())
    }

    /// Returns the current number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

type Predicate = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// Receiver wrapper that skips events not matching a predicate.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus};
///
/// let bus = EventBus::new(16);
/// let stream = bus.stream().filter(|e| matches!(e, CoreEvent::Backup(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    predicate: Option<Predicate>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            predicate: None,
        }
    }

    /// Keep only events for which `predicate` returns true.
    pub fn filter(mut self, predicate: impl Fn(&CoreEvent) -> bool + Send + Sync + 'static) -> Self {
        self.predicate = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.predicate.as_ref().map_or(true, |keep| keep(event))
    }

    /// Receives the next matching event.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.accepts(&event) => return Ok(event),
                Ok(_) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Returns the next buffered matching event without waiting.
    ///
    /// `None` means nothing matching is buffered right now.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        use broadcast::error::TryRecvError;

        loop {
            let event = match self.receiver.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Lagged(missed)) => return Some(Err(RecvError::Lagged(missed))),
                Err(TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            };
            if self.accepts(&event) {
                return Some(Ok(event));
            }
        }
    }

    /// Drains every buffered matching event, stopping at the first gap.
    pub fn drain(&mut self) -> Vec<CoreEvent> {
        let mut events = Vec::new();
        while let Some(Ok(event)) = self.try_recv() {
            events.push(event);
        }
        events
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("filtered", &self.predicate.is_some())
            .finish()
    }
}
