//! Cookie-less visitor correlation.

use chrono::NaiveDate;
use sha2::{Digest, Sha256};

/// Derives the session fingerprint for a visitor on a given calendar day.
///
/// The fingerprint is the first 64 bits of `SHA-256("{address}-{user_agent}-{day}")`
/// rendered as 16 lowercase hex digits. It is a pure function of its inputs,
/// so it is stable across restarts, and it changes every day so sessions roll
/// over at midnight. This is a correlation key for telemetry, not a security
/// token: collisions are tolerated.
#[must_use]
pub fn fingerprint(address: &str, user_agent: &str, day: NaiveDate) -> String {
    let mut hasher = Sha256::new();
    hasher.update(address.as_bytes());
    hasher.update(b"-");
    hasher.update(user_agent.as_bytes());
    hasher.update(b"-");
    hasher.update(day.format("%Y-%m-%d").to_string().as_bytes());
    let digest = hasher.finalize();

    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    format!("{:016x}", u64::from_be_bytes(head))
}
