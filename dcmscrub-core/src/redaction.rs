// dcmscrub-core/src/redaction.rs
//! PII-safe rendering of sensitive values for debug logging.
//!
//! Identifiers and dates handled by the scrubber are exactly the values that
//! must not leak into logs. Unless `DCMSCRUB_ALLOW_DEBUG_PII=true` is set, they
//! are rendered as a redaction marker plus a short fingerprint so that log
//! lines for the same value can still be correlated.

use lazy_static::lazy_static;
use log::debug;
use sha2::{Digest, Sha256};

use crate::record::Tag;

/// Values up to this length are redacted without revealing their length.
const SHORT_VALUE_LEN: usize = 8;

lazy_static! {
    /// Read once per process.
    static ref ALLOW_DEBUG_PII: bool = std::env::var("DCMSCRUB_ALLOW_DEBUG_PII")
        .is_ok_and(|v| v.eq_ignore_ascii_case("true"));
}

pub fn redact_sensitive(value: &str) -> String {
    match value.len() {
        n if n <= SHORT_VALUE_LEN => "[REDACTED]".to_string(),
        n => format!("[REDACTED: {} chars]", n),
    }
}

/// First 12 hex digits of the SHA-256 of `value`.
pub fn fingerprint(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    hex::encode(&digest[..6])
}

/// The form of `sensitive` that may be written to logs.
pub fn loggable(sensitive: &str) -> String {
    if *ALLOW_DEBUG_PII {
        sensitive.to_string()
    } else {
        format!("{} #{}", redact_sensitive(sensitive), fingerprint(sensitive))
    }
}

pub fn log_substitution_debug(tag: Tag, original: &str, rewritten: &str) {
    debug!(
        "Rewrote {}: '{}' -> '{}'",
        tag,
        loggable(original),
        loggable(rewritten)
    );
}

pub fn log_pair_debug(field: &str, original: &str, replacement: &str) {
    debug!(
        "Sensitive pair for {}: '{}' -> '{}'",
        field,
        loggable(original),
        loggable(replacement)
    );
}
