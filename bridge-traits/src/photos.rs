//! Remote Photo Service Abstractions
//!
//! The backup core never talks to a photo service directly. Hosts provide a
//! [`PhotoService`] that signs in, lists the library once and hands out
//! [`RemoteAsset`] handles which the core downloads and, on request, deletes.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::{self, Stream};
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Result;

/// Stream of downloaded chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Payload returned by [`RemoteAsset::download`].
///
/// Some remote APIs hand back the whole file in one buffer, others expose an
/// incremental stream. Both shapes are consumed the same way through
/// [`DownloadBody::into_stream`].
pub enum DownloadBody {
    /// The complete file contents
    Whole(Bytes),
    /// Incremental chunks, in order
    Chunked(ByteStream),
}

impl DownloadBody {
    /// Wrap a chunk stream
    pub fn chunked<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes>> + Send + 'static,
    {
        Self::Chunked(Box::pin(stream))
    }

    /// View the body as a stream of chunks. A whole body yields exactly one chunk.
    pub fn into_stream(self) -> ByteStream {
        match self {
            DownloadBody::Whole(bytes) => Box::pin(stream::once(async move { Ok(bytes) })),
            DownloadBody::Chunked(stream) => stream,
        }
    }
}

impl From<Bytes> for DownloadBody {
    fn from(bytes: Bytes) -> Self {
        DownloadBody::Whole(bytes)
    }
}

impl fmt::Debug for DownloadBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadBody::Whole(bytes) => f.debug_tuple("Whole").field(&bytes.len()).finish(),
            DownloadBody::Chunked(_) => f.write_str("Chunked(..)"),
        }
    }
}

/// Handle to one photo or video in the remote library.
///
/// `download` and `delete` are single-shot operations: calling `download`
/// twice starts two independent transfers, and calling `delete` on an asset
/// that is already gone may fail with [`BridgeError::NotFound`](crate::BridgeError::NotFound).
#[async_trait]
pub trait RemoteAsset: Send + Sync {
    /// Stable identifier assigned by the remote service
    fn id(&self) -> &str;

    /// Original filename, used as the local file name
    fn filename(&self) -> &str;

    /// Capture timestamp, when the service knows it
    fn created(&self) -> Option<DateTime<Utc>>;

    /// Size advertised by the service, if any
    fn size_hint(&self) -> Option<u64> {
        None
    }

    /// Fetch the original bytes
    async fn download(&self) -> Result<DownloadBody>;

    /// Remove the asset from the remote library
    async fn delete(&self) -> Result<()>;
}

/// Account credentials for the remote service.
///
/// The password is never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Result of a first authentication step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthChallenge {
    /// Session is ready for use
    Authenticated,
    /// The account requires a verification code before the session is usable
    TwoFactorRequired,
}

/// Remote photo library collaborator.
///
/// Implementations own session handling; once `authenticate` (and, when
/// challenged, `submit_two_factor_code`) succeeded, `list_assets` must return
/// the full library materialized in the service's own order.
#[async_trait]
pub trait PhotoService: Send + Sync {
    /// Start a session with the given credentials
    async fn authenticate(&self, credentials: &Credentials) -> Result<AuthChallenge>;

    /// Answer a two-factor challenge. Returns `false` when the code was rejected.
    async fn submit_two_factor_code(&self, code: &str) -> Result<bool>;

    /// List every asset in the library
    async fn list_assets(&self) -> Result<Vec<Arc<dyn RemoteAsset>>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_whole_body_yields_single_chunk() {
        let body = DownloadBody::from(Bytes::from_static(b"jpeg"));
        let chunks: Vec<_> = body.into_stream().collect().await;

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].as_ref().unwrap().as_ref(), b"jpeg");
    }

    #[tokio::test]
    async fn test_chunked_body_preserves_order() {
        let body = DownloadBody::chunked(stream::iter(vec![
            Ok(Bytes::from_static(b"ab")),
            Ok(Bytes::from_static(b"cd")),
        ]));
        let chunks: Vec<Bytes> = body
            .into_stream()
            .map(|chunk| chunk.unwrap())
            .collect()
            .await;

        assert_eq!(chunks, vec![Bytes::from_static(b"ab"), Bytes::from_static(b"cd")]);
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let credentials = Credentials::new("user@example.com", "hunter2");
        let printed = format!("{:?}", credentials);

        assert!(printed.contains("user@example.com"));
        assert!(!printed.contains("hunter2"));
    }
}
