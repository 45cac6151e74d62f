//! Salted entry names.
//!
//! An entry is stored as `<timestamp>~<hex>` where
//! `hex = sha256(salt + sha256(content) + timestamp)`. The name is both the
//! entry's identity and its integrity check: without the salt a name
//! cannot be forged, and changing the content invalidates it.

use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

/// Separator between the timestamp and the salted digest.
pub const SEPARATOR: char = '~';

/// Lowercase hex SHA-256 of `bytes`.
pub fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Build the entry name for content whose digest is `content_digest`.
pub fn entry_name(salt: &str, content_digest: &str, timestamp: u64) -> String {
    let salted = digest(format!("{salt}{content_digest}{timestamp}").as_bytes());
    format!("{timestamp}{SEPARATOR}{salted}")
}

/// Split a name into its timestamp and digest parts.
///
/// Returns `None` unless there are exactly two parts, the first all digits
/// and the second alphanumeric.
pub fn parse_entry_name(name: &str) -> Option<(u64, &str)> {
    let mut parts = name.split(SEPARATOR);
    let (timestamp, salted) = match (parts.next(), parts.next(), parts.next()) {
        (Some(timestamp), Some(salted), None) => (timestamp, salted),
        _ => return None,
    };

    if timestamp.is_empty() || !timestamp.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if salted.is_empty() || !salted.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return None;
    }

    timestamp.parse().ok().map(|ts| (ts, salted))
}

/// Seconds since the Unix epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Constant-time string comparison.
pub(crate) fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
