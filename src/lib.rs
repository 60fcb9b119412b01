//! Umbrella crate for hosts that want the whole backup core behind one
//! dependency.
//!
//! With the default `desktop-shims` feature the sign-in and backup crates are
//! re-exported with Tokio-backed file system and sleeper defaults.

#[cfg(feature = "desktop-shims")]
pub use core_auth as auth;
#[cfg(feature = "desktop-shims")]
pub use core_backup as backup;
