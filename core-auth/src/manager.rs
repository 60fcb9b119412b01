//! # Authentication Manager
//!
//! Drives a [`PhotoService`] through sign-in and the optional two-factor
//! challenge.
//!
//! ## Overview
//!
//! The flow is:
//! 1. `authenticate` with the account credentials
//! 2. If the service answers `TwoFactorRequired`, ask the caller's
//!    [`TwoFactorPrompt`] for a code and submit it, up to
//!    `max_code_attempts` times
//! 3. Record the [`Session`] and emit `SignedIn`
//!
//! Every remote call is bounded by a timeout. Time spent waiting on the
//! prompt is not, since that is a person typing.
//!
//! ## Usage
//!
//! ```ignore
//! use core_auth::{AuthManager, Credentials};
//! use core_runtime::events::EventBus;
//!
//! let manager = AuthManager::new(service, EventBus::new(256));
//! let prompt = |_attempt: u32| read_code_from_dialog();
//! let session = manager
//!     .sign_in(&Credentials::new("ana@example.com", password), &prompt)
//!     .await?;
//! ```

use crate::error::{AuthError, Result};
use crate::types::{AuthState, Session, TwoFactorPrompt};
use bridge_traits::{AuthChallenge, BridgeError, Clock, Credentials, PhotoService, SystemClock};
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use core_runtime::logging::redact_if_sensitive;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, instrument, warn};

/// Default timeout for a single remote authentication call (2 minutes)
const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(120);

/// Default number of verification codes accepted before giving up
const DEFAULT_MAX_CODE_ATTEMPTS: u32 = 3;

/// Sign-in orchestrator for one photo service account.
pub struct AuthManager {
    service: Arc<dyn PhotoService>,
    event_bus: EventBus,
    clock: Arc<dyn Clock>,
    state: Arc<RwLock<AuthState>>,
    /// Held for the duration of a sign-in to reject concurrent attempts
    sign_in_lock: Mutex<()>,
    max_code_attempts: u32,
    call_timeout: Duration,
}

impl AuthManager {
    pub fn new(service: Arc<dyn PhotoService>, event_bus: EventBus) -> Self {
        Self {
            service,
            event_bus,
            clock: Arc::new(SystemClock),
            state: Arc::new(RwLock::new(AuthState::SignedOut)),
            sign_in_lock: Mutex::new(()),
            max_code_attempts: DEFAULT_MAX_CODE_ATTEMPTS,
            call_timeout: DEFAULT_AUTH_TIMEOUT,
        }
    }

    /// Number of verification codes to try before failing (minimum 1).
    pub fn with_max_code_attempts(mut self, attempts: u32) -> Self {
        self.max_code_attempts = attempts.max(1);
        self
    }

    pub fn with_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Current state of the flow.
    pub async fn state(&self) -> AuthState {
        self.state.read().await.clone()
    }

    /// The active session, if signed in.
    pub async fn session(&self) -> Result<Session> {
        match &*self.state.read().await {
            AuthState::SignedIn(session) => Ok(session.clone()),
            _ => Err(AuthError::NotAuthenticated),
        }
    }

    /// The underlying service, only once a session exists.
    pub async fn authenticated_service(&self) -> Result<Arc<dyn PhotoService>> {
        self.session().await?;
        Ok(Arc::clone(&self.service))
    }

    /// Forget the current session.
    pub async fn sign_out(&self) {
        *self.state.write().await = AuthState::SignedOut;
        debug!("Signed out");
    }

    /// Sign in, answering a two-factor challenge through `prompt` if the
    /// service raises one.
    ///
    /// # Errors
    ///
    /// - [`AuthError::SignInInProgress`] if another sign-in is running
    /// - [`AuthError::AuthenticationFailed`] if the credentials were refused
    /// - [`AuthError::TwoFactorAborted`] if the prompt returned no code
    /// - [`AuthError::TwoFactorRejected`] once every allowed code was refused
    /// - [`AuthError::Timeout`] if a remote call took too long
    #[instrument(
        skip(self, credentials, prompt),
        fields(account = %redact_if_sensitive("account", &credentials.username))
    )]
    pub async fn sign_in(
        &self,
        credentials: &Credentials,
        prompt: &dyn TwoFactorPrompt,
    ) -> Result<Session> {
        let _guard = self
            .sign_in_lock
            .try_lock()
            .map_err(|_| AuthError::SignInInProgress)?;

        let account = redact_if_sensitive("account", &credentials.username);
        self.set_state(AuthState::SigningIn).await;
        self.emit(AuthEvent::SigningIn {
            account: account.clone(),
        });
        info!("Signing in to photo service");

        match self.run_sign_in(credentials, prompt, &account).await {
            Ok(session) => {
                self.set_state(AuthState::SignedIn(session.clone())).await;
                self.emit(AuthEvent::SignedIn {
                    account: account.clone(),
                    two_factor: session.two_factor,
                });
                info!(two_factor = session.two_factor, "Signed in");
                Ok(session)
            }
            Err(e) => {
                self.set_state(AuthState::SignedOut).await;
                self.emit(AuthEvent::AuthError {
                    account: Some(account),
                    message: e.to_string(),
                    recoverable: e.is_recoverable(),
                });
                error!(error = %e, "Sign-in failed");
                Err(e)
            }
        }
    }

    async fn run_sign_in(
        &self,
        credentials: &Credentials,
        prompt: &dyn TwoFactorPrompt,
        account: &str,
    ) -> Result<Session> {
        let challenge = self
            .call(self.service.authenticate(credentials))
            .await
            .map_err(Self::refused_credentials)?;

        let two_factor = match challenge {
            AuthChallenge::Authenticated => false,
            AuthChallenge::TwoFactorRequired => {
                self.complete_two_factor(prompt, account).await?;
                true
            }
        };

        Ok(Session {
            account: account.to_string(),
            two_factor,
            signed_in_at: self.clock.now(),
        })
    }

    async fn complete_two_factor(&self, prompt: &dyn TwoFactorPrompt, account: &str) -> Result<()> {
        self.emit(AuthEvent::TwoFactorRequired {
            account: account.to_string(),
        });
        info!("Two-factor authentication required");

        for attempt in 1..=self.max_code_attempts {
            self.set_state(AuthState::AwaitingTwoFactor { attempt }).await;

            let Some(code) = prompt.request_code(attempt).await else {
                warn!(attempt, "No two-factor code provided");
                return Err(AuthError::TwoFactorAborted);
            };

            let code = code.trim();
            let accepted = if code.is_empty() {
                false
            } else {
                self.call(self.service.submit_two_factor_code(code)).await?
            };

            if accepted {
                debug!(attempt, "Two-factor code accepted");
                return Ok(());
            }

            warn!(attempt, max_attempts = self.max_code_attempts, "Two-factor code rejected");
            self.emit(AuthEvent::TwoFactorRejected {
                account: account.to_string(),
            });
        }

        Err(AuthError::TwoFactorRejected {
            attempts: self.max_code_attempts,
        })
    }

    async fn call<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = bridge_traits::error::Result<T>>,
    {
        match timeout(self.call_timeout, fut).await {
            Ok(result) => result.map_err(AuthError::from),
            Err(_) => Err(AuthError::Timeout(self.call_timeout)),
        }
    }

    fn refused_credentials(error: AuthError) -> AuthError {
        match error {
            AuthError::Service(BridgeError::PermissionDenied(message)) => {
                AuthError::AuthenticationFailed(message)
            }
            AuthError::Service(BridgeError::Http {
                status: 401 | 403,
                message,
            }) => AuthError::AuthenticationFailed(message),
            other => other,
        }
    }

    async fn set_state(&self, state: AuthState) {
        *self.state.write().await = state;
    }

    fn emit(&self, event: AuthEvent) {
        self.event_bus.emit(CoreEvent::Auth(event)).ok();
    }
}
