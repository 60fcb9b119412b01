use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the sign-in flow currently stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthState {
    SignedOut,
    SigningIn,
    AwaitingTwoFactor { attempt: u32 },
    SignedIn(Session),
}

impl AuthState {
    pub fn is_signed_in(&self) -> bool {
        matches!(self, AuthState::SignedIn(_))
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthState::SignedOut => write!(f, "signed out"),
            AuthState::SigningIn => write!(f, "signing in"),
            AuthState::AwaitingTwoFactor { attempt } => {
                write!(f, "awaiting two-factor code (attempt {})", attempt)
            }
            AuthState::SignedIn(session) => write!(f, "signed in as {}", session.account),
        }
    }
}

/// An established session with the photo service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Redacted account name, safe to log and display
    pub account: String,
    /// Whether a verification code was needed
    pub two_factor: bool,
    pub signed_in_at: DateTime<Utc>,
}

/// Source of two-factor verification codes.
///
/// Called once per attempt with the 1-based attempt number. Returning `None`
/// abandons the sign-in. Hosts typically show a dialog or read a terminal
/// line here; the core never does console I/O itself.
///
/// Closures work directly:
///
/// ```
/// use core_auth::TwoFactorPrompt;
///
/// fn accepts_prompt(_prompt: &dyn TwoFactorPrompt) {}
///
/// accepts_prompt(&|_attempt: u32| Some("123456".to_string()));
/// ```
#[async_trait]
pub trait TwoFactorPrompt: Send + Sync {
    async fn request_code(&self, attempt: u32) -> Option<String>;
}

#[async_trait]
impl<F> TwoFactorPrompt for F
where
    F: Fn(u32) -> Option<String> + Send + Sync,
{
    async fn request_code(&self, attempt: u32) -> Option<String> {
        self(attempt)
    }
}

/// Prompt for accounts that are known not to use two-factor.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTwoFactor;

#[async_trait]
impl TwoFactorPrompt for NoTwoFactor {
    async fn request_code(&self, _attempt: u32) -> Option<String> {
        None
    }
}
