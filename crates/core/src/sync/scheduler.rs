//! Scheduler constants and coordinator configuration.

use std::time::Duration;

/// Safety-net poll cadence in seconds.
pub const SYNC_POLL_INTERVAL_SECS: u64 = 30;

/// Base delay (seconds) for batch-level backoff after a failed pass.
pub const SYNC_BACKOFF_BASE_SECS: u64 = 5;

/// Backoff stops growing after this many consecutive failed passes.
pub const SYNC_BACKOFF_MAX_EXPONENT: u32 = 8;

/// Capacity of the coordinator's event broadcast channel.
pub const SYNC_EVENT_CHANNEL_CAPACITY: usize = 64;

/// Tag registered with an optional platform background-sync hook.
pub const BACKGROUND_SYNC_TAG: &str = "quiz-sync-outbox";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub poll_interval: Duration,
    pub backoff_base_secs: u64,
    pub backoff_max_exponent: u32,
    /// Attempt an immediate drain after a local mutation while online.
    pub drain_on_submit: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(SYNC_POLL_INTERVAL_SECS),
            backoff_base_secs: SYNC_BACKOFF_BASE_SECS,
            backoff_max_exponent: SYNC_BACKOFF_MAX_EXPONENT,
            drain_on_submit: true,
        }
    }
}
