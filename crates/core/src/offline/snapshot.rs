//! Backup/restore payload for the whole local store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};
use crate::sync::PendingMutation;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    pub animals: Vec<serde_json::Value>,
    pub quizzes: Vec<serde_json::Value>,
    pub pending_sync: Vec<PendingMutation>,
    pub timestamp: DateTime<Utc>,
    pub version: u32,
}

impl StoreSnapshot {
    pub fn validate(&self) -> Result<()> {
        if self.version == 0 || self.version > SNAPSHOT_VERSION {
            return Err(Error::invalid_snapshot(format!(
                "Unsupported snapshot version {} (expected 1..={})",
                self.version, SNAPSHOT_VERSION
            )));
        }
        Ok(())
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let snapshot: StoreSnapshot = serde_json::from_str(raw)
            .map_err(|e| Error::invalid_snapshot(format!("Malformed snapshot: {}", e)))?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn snapshot_uses_wire_field_names() {
        let snapshot = StoreSnapshot {
            animals: vec![json!({"id": "a1"})],
            quizzes: vec![],
            pending_sync: vec![],
            timestamp: Utc::now(),
            version: SNAPSHOT_VERSION,
        };
        let value = serde_json::to_value(&snapshot).expect("encode");
        for key in ["animals", "quizzes", "pendingSync", "timestamp", "version"] {
            assert!(value.get(key).is_some(), "missing {}", key);
        }
    }

    #[test]
    fn rejects_unknown_versions_and_garbage() {
        let raw = json!({
            "animals": [], "quizzes": [], "pendingSync": [],
            "timestamp": "2026-01-10T00:00:00Z", "version": 9
        })
        .to_string();
        assert!(matches!(
            StoreSnapshot::from_json(&raw),
            Err(Error::InvalidSnapshot(_))
        ));
        assert!(matches!(
            StoreSnapshot::from_json("not json"),
            Err(Error::InvalidSnapshot(_))
        ));
    }
}
