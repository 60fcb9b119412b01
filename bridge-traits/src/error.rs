use std::time::Duration;

use thiserror::Error;

/// Errors reported by host bridges and remote collaborators.
///
/// Remote implementations should prefer the structured variants (`Http`,
/// `RateLimited`, `Network`, `Timeout`, `NotFound`, `PermissionDenied`) so the
/// core can classify failures without inspecting messages. `OperationFailed`
/// is the escape hatch for errors the remote API only describes in prose.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Remote API error (status {status}): {message}")]
    Http { status: u16, message: String },

    #[error("Rate limited by remote service")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Remote item not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// HTTP status code carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            BridgeError::Http { status, .. } => Some(*status),
            BridgeError::RateLimited { .. } => Some(429),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = BridgeError::Http {
            status: 503,
            message: "Service Unavailable".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "Remote API error (status 503): Service Unavailable"
        );
        assert_eq!(error.status(), Some(503));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let error: BridgeError = io.into();

        assert!(matches!(error, BridgeError::Io(_)));
        assert_eq!(error.status(), None);
    }
}
