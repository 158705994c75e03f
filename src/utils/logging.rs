//! Structured Logging with Sensitive Data Redaction
//!
//! Session events are emitted through `tracing`. Values that must not reach
//! logs in full (root signatures, key material) go through the redaction
//! helpers below before they are attached as fields.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter used when `RUST_LOG` is not set
pub const DEFAULT_LOG_FILTER: &str = "multichain_validation=info";

/// Install a global `tracing` subscriber.
///
/// Honours `RUST_LOG` and falls back to [`DEFAULT_LOG_FILTER`]. Calling this
/// more than once is harmless: later calls leave the first subscriber in place.
pub fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init();
}

/// Fully redact a sensitive value
pub fn redact_value(value: &str) -> String {
    if value.is_empty() {
        return "[EMPTY]".to_string();
    }

    let len = value.len();
    if len <= 4 {
        "[REDACTED]".to_string()
    } else {
        format!("[REDACTED:{}chars]", len)
    }
}

/// Short hex preview of raw bytes (first 6 and last 4 bytes).
///
/// Used for signatures and blobs: enough to correlate log lines, not enough
/// to replay anything.
pub fn redact_hex(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "[EMPTY]".to_string();
    }
    if bytes.len() <= 10 {
        return redact_value(&hex::encode(bytes));
    }
    format!(
        "0x{}...{} ({} bytes)",
        hex::encode(&bytes[..6]),
        hex::encode(&bytes[bytes.len() - 4..]),
        bytes.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_value() {
        assert_eq!(redact_value(""), "[EMPTY]");
        assert_eq!(redact_value("abc"), "[REDACTED]");
        assert_eq!(redact_value("abcdefgh"), "[REDACTED:8chars]");
    }

    #[test]
    fn test_redact_hex_never_shows_full_signature() {
        let sig = [0xabu8; 65];
        let redacted = redact_hex(&sig);
        assert!(redacted.starts_with("0xabababababab..."));
        assert!(redacted.ends_with("(65 bytes)"));
        assert!(!redacted.contains(&hex::encode(sig)));
    }

    #[test]
    fn test_redact_hex_short_input() {
        assert_eq!(redact_hex(&[]), "[EMPTY]");
        assert_eq!(redact_hex(&[0xab; 8]), "[REDACTED:16chars]");
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging();
        init_logging();
    }
}
