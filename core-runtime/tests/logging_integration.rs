//! Integration tests for logging system

use bridge_traits::time::LogLevel;
use core_runtime::logging::{
    init_logging, redact_if_sensitive, strip_path, LogFormat, LoggingConfig,
};

#[test]
fn test_logging_initializes_once() {
    // A process only gets one global subscriber
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug);

    assert!(init_logging(config.clone()).is_ok());
    assert!(init_logging(config).is_err());

    tracing::info!(asset_id = "A1", "Logging ready");
}

#[test]
fn test_credentials_are_redacted() {
    assert_eq!(redact_if_sensitive("password", "correct horse"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("two_factor_code", "123456"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("session_token", "tok"), "[REDACTED]");
}

#[test]
fn test_apple_id_is_masked() {
    let redacted = redact_if_sensitive("account", "someone@icloud.com");

    assert!(redacted.starts_with('s'));
    assert!(redacted.contains("[REDACTED]"));
    assert!(!redacted.contains("icloud.com"));
}

#[test]
fn test_plain_values_pass_through() {
    assert_eq!(redact_if_sensitive("asset_id", "AbC123"), "AbC123");
    assert_eq!(redact_if_sensitive("filename", "IMG_0001.JPG"), "IMG_0001.JPG");
    assert_eq!(redact_if_sensitive("attempt", "3"), "3");
}

#[test]
fn test_path_stripping() {
    assert_eq!(strip_path("/backup/2023/03/Foto/IMG_0001.JPG"), "IMG_0001.JPG");
    assert_eq!(strip_path("E:\\Backup\\Unknown\\Unknown\\Video\\clip.mov"), "clip.mov");
    assert_eq!(strip_path("clip.mov"), "clip.mov");
    assert_eq!(strip_path(""), "");
}

#[test]
fn test_format_selection() {
    #[cfg(debug_assertions)]
    assert_eq!(LoggingConfig::default().format, LogFormat::Pretty);

    #[cfg(not(debug_assertions))]
    assert_eq!(LoggingConfig::default().format, LogFormat::Json);
}
