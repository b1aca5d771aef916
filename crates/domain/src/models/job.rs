//! Batch job bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::concurrency::ConcurrencyToken;
use validator::Validate;

use super::entity::{Entity, EntitySchema, FieldDef, FieldKind, NoLink};

/// A batch run over a list of target items. Terminal once `ended` is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    #[serde(default)]
    pub id: i64,

    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: String,

    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub started: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended: Option<DateTime<Utc>>,

    #[validate(range(min = 0, message = "Expected count cannot be negative"))]
    #[serde(default)]
    pub expected_count: i32,
    #[validate(range(min = 0, message = "Success count cannot be negative"))]
    #[serde(default)]
    pub success_count: i32,
    #[validate(range(min = 0, message = "Failure count cannot be negative"))]
    #[serde(default)]
    pub failure_count: i32,

    #[validate(length(max = 50, message = "Item type cannot exceed 50 characters"))]
    #[serde(default)]
    pub item_type: String,

    #[serde(default)]
    pub item_ids: Vec<i64>,

    #[serde(default)]
    pub concurrency_token: Option<ConcurrencyToken>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub job_items: Vec<JobItem>,
}

impl Job {
    pub fn is_finished(&self) -> bool {
        self.ended.is_some()
    }
}

static JOB_FIELDS: &[FieldDef] = &[
    FieldDef::new("id", FieldKind::Int),
    FieldDef::new("name", FieldKind::Text),
    FieldDef::nullable("created", FieldKind::Timestamp),
    FieldDef::nullable("started", FieldKind::Timestamp),
    FieldDef::nullable("updated", FieldKind::Timestamp),
    FieldDef::nullable("ended", FieldKind::Timestamp),
    FieldDef::new("expectedCount", FieldKind::Int),
    FieldDef::new("successCount", FieldKind::Int),
    FieldDef::new("failureCount", FieldKind::Int),
    FieldDef::new("itemType", FieldKind::Text),
];

static JOB_SCHEMA: EntitySchema = EntitySchema {
    resource: "jobs",
    entity_name: "Job",
    id_field: "id",
    fields: JOB_FIELDS,
    includes: &["jobItems"],
    soft_delete: false,
    versioned: true,
};

impl Entity for Job {
    type Link = NoLink;

    fn schema() -> &'static EntitySchema {
        &JOB_SCHEMA
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }

    fn strip_navigation(&mut self) {
        self.job_items.clear();
    }

    fn concurrency_token(&self) -> Option<&ConcurrencyToken> {
        self.concurrency_token.as_ref()
    }

    fn set_concurrency_token(&mut self, token: ConcurrencyToken) {
        self.concurrency_token = Some(token);
    }
}

/// Outcome of one item within a job. Immutable after insert.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JobItem {
    #[serde(default)]
    pub id: i64,

    #[validate(range(min = 1, message = "A job is required"))]
    pub job_id: i64,

    #[serde(default)]
    pub item_id: Option<i64>,

    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,

    #[validate(length(max = 4000, message = "Note cannot exceed 4000 characters"))]
    #[serde(default)]
    pub note: String,
}

static JOB_ITEM_FIELDS: &[FieldDef] = &[
    FieldDef::new("id", FieldKind::Int),
    FieldDef::new("jobId", FieldKind::Int),
    FieldDef::nullable("itemId", FieldKind::Int),
    FieldDef::nullable("timestamp", FieldKind::Timestamp),
    FieldDef::new("note", FieldKind::Text),
];

static JOB_ITEM_SCHEMA: EntitySchema = EntitySchema {
    resource: "jobItems",
    entity_name: "JobItem",
    id_field: "id",
    fields: JOB_ITEM_FIELDS,
    includes: &[],
    soft_delete: false,
    versioned: false,
};

impl Entity for JobItem {
    type Link = NoLink;

    fn schema() -> &'static EntitySchema {
        &JOB_ITEM_SCHEMA
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn strip_navigation(&mut self) {}
}
