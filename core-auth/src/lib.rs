//! # Authentication Module
//!
//! Sign-in to the remote photo service, including the two-factor
//! challenge/response step.
//!
//! ## Overview
//!
//! The photo service itself is a host-provided [`PhotoService`]. This crate
//! drives it through the sign-in sequence, asks a caller-supplied
//! [`TwoFactorPrompt`] for verification codes, tracks the resulting
//! [`AuthState`] and reports every step on the event bus.
//!
//! [`PhotoService`]: bridge_traits::PhotoService

pub mod error;
pub mod manager;
pub mod types;

pub use bridge_traits::Credentials;
pub use error::{AuthError, Result};
pub use manager::AuthManager;
pub use types::{AuthState, NoTwoFactor, Session, TwoFactorPrompt};
