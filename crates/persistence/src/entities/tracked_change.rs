//! Audit row entity (database row mapping), shared by every tracked table.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use domain::models::TrackedChange;

#[derive(Debug, Clone, FromRow)]
pub struct TrackedChangeEntity {
    pub id: i64,
    pub entity_id: i64,
    pub timestamp: DateTime<Utc>,
    pub application_user_id: Option<i64>,
    pub old_value: Option<serde_json::Value>,
    pub new_value: serde_json::Value,
}

impl From<TrackedChangeEntity> for TrackedChange {
    fn from(entity: TrackedChangeEntity) -> Self {
        Self {
            id: entity.id,
            entity_id: entity.entity_id,
            timestamp: entity.timestamp,
            application_user_id: entity.application_user_id,
            old_value: entity.old_value,
            new_value: entity.new_value,
        }
    }
}
