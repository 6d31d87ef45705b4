//! Outbox entries and sync engine status models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::retry::SyncRetryClass;

/// Kinds of user mutation that can be queued for the remote API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    QuizResult,
    UserProgress,
    BadgeEarned,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::QuizResult => "quiz_result",
            MutationKind::UserProgress => "user_progress",
            MutationKind::BadgeEarned => "badge_earned",
        }
    }
}

/// A not-yet-confirmed server-side effect stored in the outbox.
///
/// `kind`, `payload`, `auth_snapshot`, `idempotency_key` and `created_at` never
/// change after creation. Only the failure bookkeeping moves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingMutation {
    pub id: u64,
    pub kind: MutationKind,
    pub payload: serde_json::Value,
    /// Bearer token captured at enqueue time; not refreshed at drain time.
    pub auth_snapshot: String,
    /// Sent as `Idempotency-Key` on every delivery attempt.
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
    pub attempts: u32,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub last_error_code: Option<String>,
}

impl PendingMutation {
    pub fn new(
        id: u64,
        kind: MutationKind,
        payload: serde_json::Value,
        auth_snapshot: impl Into<String>,
    ) -> Self {
        Self {
            id,
            kind,
            payload,
            auth_snapshot: auth_snapshot.into(),
            idempotency_key: Uuid::now_v7().to_string(),
            created_at: Utc::now(),
            attempts: 0,
            last_error: None,
            last_error_code: None,
        }
    }

    /// True once a non-retryable failure has been recorded for this entry.
    pub fn is_flagged(&self) -> bool {
        self.last_error_code.as_deref() == Some(SyncRetryClass::Permanent.code())
    }
}

/// Trigger source for drain cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncCycleTrigger {
    Startup,
    ConnectivityRestored,
    Periodic,
    Manual,
    LocalMutation,
    Retry,
}

/// Why a drain request did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainSkipReason {
    Offline,
    AlreadyDraining,
}

/// Result of one drain pass over an outbox snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    pub trigger: SyncCycleTrigger,
    pub attempted: usize,
    pub delivered: usize,
    pub retryable_failures: usize,
    pub permanent_failures: usize,
    /// A captured token was rejected with 401/403.
    pub auth_blocked: bool,
    /// Entries left queued because their captured token was rejected.
    pub auth_deferred: usize,
    /// Connectivity dropped mid-pass.
    pub interrupted: bool,
    pub remaining: usize,
    pub duration_ms: i64,
}

impl DrainReport {
    pub(crate) fn new(trigger: SyncCycleTrigger) -> Self {
        Self {
            trigger,
            attempted: 0,
            delivered: 0,
            retryable_failures: 0,
            permanent_failures: 0,
            auth_blocked: false,
            auth_deferred: 0,
            interrupted: false,
            remaining: 0,
            duration_ms: 0,
        }
    }

    pub fn status(&self) -> &'static str {
        if self.auth_blocked {
            "auth_required"
        } else if self.interrupted {
            "interrupted"
        } else if self.retryable_failures > 0 || self.permanent_failures > 0 {
            "partial"
        } else {
            "ok"
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DrainOutcome {
    Completed(DrainReport),
    Skipped { reason: DrainSkipReason },
}

impl DrainOutcome {
    pub fn report(&self) -> Option<&DrainReport> {
        match self {
            DrainOutcome::Completed(report) => Some(report),
            DrainOutcome::Skipped { .. } => None,
        }
    }
}

/// Signals published by the coordinator for the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    DrainStarted { trigger: SyncCycleTrigger },
    DrainCompleted { report: DrainReport },
    AuthRequired { mutation_id: u64 },
    RetryScheduled { delay_ms: u64 },
}

/// Lightweight coordinator status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub draining: bool,
    pub consecutive_failures: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_drain_at: Option<DateTime<Utc>>,
    pub last_outcome: Option<String>,
    pub last_error: Option<String>,
    pub auth_required: bool,
}
