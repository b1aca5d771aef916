//! Job and job item entities (database row mappings).

use chrono::{DateTime, Utc};
use shared::concurrency::ConcurrencyToken;
use sqlx::types::Json;
use sqlx::FromRow;

use domain::models::{Job, JobItem};

/// Database row mapping for the jobs table.
#[derive(Debug, Clone, FromRow)]
pub struct JobEntity {
    pub id: i64,
    pub name: String,
    pub created: Option<DateTime<Utc>>,
    pub started: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub ended: Option<DateTime<Utc>>,
    pub expected_count: i32,
    pub success_count: i32,
    pub failure_count: i32,
    pub item_type: String,
    pub item_ids: Json<Vec<i64>>,
    pub version: i64,
}

impl From<JobEntity> for Job {
    fn from(entity: JobEntity) -> Self {
        Self {
            id: entity.id,
            name: entity.name,
            created: entity.created,
            started: entity.started,
            updated: entity.updated,
            ended: entity.ended,
            expected_count: entity.expected_count,
            success_count: entity.success_count,
            failure_count: entity.failure_count,
            item_type: entity.item_type,
            item_ids: entity.item_ids.0,
            concurrency_token: Some(ConcurrencyToken::from_version(entity.version)),
            job_items: Vec::new(),
        }
    }
}

/// Database row mapping for the job_items table.
#[derive(Debug, Clone, FromRow)]
pub struct JobItemEntity {
    pub id: i64,
    pub job_id: i64,
    pub item_id: Option<i64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub note: String,
}

impl From<JobItemEntity> for JobItem {
    fn from(entity: JobItemEntity) -> Self {
        Self {
            id: entity.id,
            job_id: entity.job_id,
            item_id: entity.item_id,
            timestamp: entity.timestamp,
            note: entity.note,
        }
    }
}
