//! Audit rows appended on every write of a change-tracked entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One before/after snapshot of an entity.
///
/// Rows are immutable once written and disappear only through the cascade
/// when their owning entity is physically deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedChange {
    pub id: i64,
    pub entity_id: i64,
    pub timestamp: DateTime<Utc>,
    pub application_user_id: Option<i64>,
    /// Snapshot before the write; `None` for the creating write.
    pub old_value: Option<serde_json::Value>,
    pub new_value: serde_json::Value,
}

impl TrackedChange {
    /// A row staged for insertion; ids are assigned at commit.
    pub fn staged(
        timestamp: DateTime<Utc>,
        application_user_id: Option<i64>,
        old_value: Option<serde_json::Value>,
        new_value: serde_json::Value,
    ) -> Self {
        Self {
            id: 0,
            entity_id: 0,
            timestamp,
            application_user_id,
            old_value,
            new_value,
        }
    }
}
