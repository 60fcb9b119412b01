//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the photo backup core:
//! - Logging and tracing infrastructure
//! - Backup configuration and retry settings
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the auth and backup crates
//! depend on. It establishes the logging conventions, the injected host
//! capabilities, and the event broadcasting used to report progress.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
