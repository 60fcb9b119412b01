use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Two-factor code rejected after {attempts} attempt(s)")]
    TwoFactorRejected { attempts: u32 },

    #[error("Two-factor code required but none was provided")]
    TwoFactorAborted,

    #[error("A sign-in is already in progress")]
    SignInInProgress,

    #[error("Sign-in timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Photo service error: {0}")]
    Service(#[from] BridgeError),
}

impl AuthError {
    /// Whether trying again with the same inputs could succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AuthError::Timeout(_) | AuthError::SignInInProgress | AuthError::Service(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
