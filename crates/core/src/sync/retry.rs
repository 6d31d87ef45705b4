//! Retry classification and batch-level backoff.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Retry policy classification for remote failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncRetryClass {
    /// Network error, timeout, 5xx: keep the entry and back off.
    Retryable,
    /// 4xx other than auth: keep the entry flagged, never auto-discard.
    Permanent,
    /// 401/403: the captured token is no longer accepted.
    ReauthRequired,
}

impl SyncRetryClass {
    pub fn code(&self) -> &'static str {
        match self {
            SyncRetryClass::Retryable => "retryable",
            SyncRetryClass::Permanent => "permanent",
            SyncRetryClass::ReauthRequired => "reauth_required",
        }
    }
}

/// Classify HTTP status into retry behavior.
pub fn classify_http_status(status: u16) -> SyncRetryClass {
    match status {
        401 | 403 => SyncRetryClass::ReauthRequired,
        408 | 409 | 423 | 425 | 429 => SyncRetryClass::Retryable,
        500..=599 => SyncRetryClass::Retryable,
        _ => SyncRetryClass::Permanent,
    }
}

/// Exponential backoff in seconds, capped at `2^max_exponent * base`.
pub fn backoff_seconds(consecutive_failures: u32, base_seconds: u64, max_exponent: u32) -> u64 {
    let capped = consecutive_failures.min(max_exponent);
    // Shifts of 64 or more overflow; saturate instead.
    let factor = 1_u64.checked_shl(capped).unwrap_or(u64::MAX);
    base_seconds.saturating_mul(factor)
}

/// Backoff for the next drain after `consecutive_failures` failed passes,
/// with up to 20% random jitter.
pub fn backoff_with_jitter(
    consecutive_failures: u32,
    base_seconds: u64,
    max_exponent: u32,
) -> Duration {
    let backoff_ms =
        backoff_seconds(consecutive_failures, base_seconds, max_exponent).saturating_mul(1_000);
    let jitter = rand::thread_rng().gen_range(0..=(backoff_ms / 5).max(1));
    Duration::from_millis(backoff_ms.saturating_add(jitter))
}
