use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{Error, Result};

/// A completed quiz as submitted by the UI. Unknown fields travel through
/// to the remote API untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizResult {
    pub quiz_id: String,
    pub score: u32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl QuizResult {
    pub fn new(quiz_id: impl Into<String>, score: u32) -> Self {
        Self {
            quiz_id: quiz_id.into(),
            score,
            extra: Map::new(),
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.quiz_id.trim().is_empty() {
            return Err(Error::invalid_request("Quiz result requires a quiz_id"));
        }
        Ok(())
    }
}

/// Learner progress document. Cached under `user_progress` by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProgress {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl UserProgress {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::invalid_request("User progress requires an id"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadgeEarned {
    pub badge_id: String,
    #[serde(default = "Utc::now")]
    pub earned_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BadgeEarned {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.badge_id.trim().is_empty() {
            return Err(Error::invalid_request("Badge requires a badge_id"));
        }
        Ok(())
    }
}

/// Returned by every offline mutation entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReceipt {
    pub mutation_id: u64,
    /// Still in the outbox after the best-effort drain.
    pub queued: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub animals: usize,
    pub quizzes: usize,
    pub pending_restored: usize,
    /// Entries whose idempotency key was already queued.
    pub pending_skipped: usize,
}
