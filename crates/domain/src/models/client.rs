//! Clients and their derived statistics.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use shared::concurrency::ConcurrencyToken;
use validator::Validate;

use super::entity::{ChangeTracked, Entity, EntitySchema, FieldDef, FieldKind, NoLink};
use super::project::Project;
use super::tracked_change::TrackedChange;

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    #[serde(default)]
    pub id: i64,

    #[validate(length(min = 1, max = 50, message = "Name must be between 1 and 50 characters"))]
    pub name: String,

    #[validate(length(max = 10, message = "Abbreviation cannot exceed 10 characters"))]
    #[serde(default)]
    pub abbreviation: String,

    #[serde(default)]
    pub concurrency_token: Option<ConcurrencyToken>,

    #[serde(default)]
    pub deleted: bool,

    #[serde(default)]
    pub last_modification: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub projects: Vec<Project>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_stats: Option<ClientStats>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tracked_changes: Vec<TrackedChange>,
}

static CLIENT_FIELDS: &[FieldDef] = &[
    FieldDef::new("id", FieldKind::Int),
    FieldDef::new("name", FieldKind::Text),
    FieldDef::new("abbreviation", FieldKind::Text),
    FieldDef::new("deleted", FieldKind::Bool),
    FieldDef::nullable("lastModification", FieldKind::Timestamp),
];

static CLIENT_SCHEMA: EntitySchema = EntitySchema {
    resource: "clients",
    entity_name: "Client",
    id_field: "id",
    fields: CLIENT_FIELDS,
    includes: &["projects", "clientStats", "trackedChanges"],
    soft_delete: true,
    versioned: true,
};

impl Entity for Client {
    type Link = NoLink;

    fn schema() -> &'static EntitySchema {
        &CLIENT_SCHEMA
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
        self.projects.clear();
        self.client_stats = None;
        self.tracked_changes.clear();
    }

    fn concurrency_token(&self) -> Option<&ConcurrencyToken> {
        self.concurrency_token.as_ref()
    }

    fn set_concurrency_token(&mut self, token: ConcurrencyToken) {
        self.concurrency_token = Some(token);
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }

    fn set_deleted(&mut self, deleted: bool) {
        self.deleted = deleted;
    }
}

impl ChangeTracked for Client {
    fn set_last_modification(&mut self, at: DateTime<Utc>) {
        self.last_modification = Some(at);
    }
}

/// Per-client aggregate over its live projects. Maintained by the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ClientStats {
    pub client_id: i64,
    pub number_of_projects: i64,
    pub first_start_date: Option<NaiveDate>,
    pub last_end_date: Option<NaiveDate>,
}

static CLIENT_STATS_FIELDS: &[FieldDef] = &[
    FieldDef::new("clientId", FieldKind::Int),
    FieldDef::new("numberOfProjects", FieldKind::Int),
    FieldDef::nullable("firstStartDate", FieldKind::Date),
    FieldDef::nullable("lastEndDate", FieldKind::Date),
];

static CLIENT_STATS_SCHEMA: EntitySchema = EntitySchema {
    resource: "clientStats",
    entity_name: "ClientStats",
    id_field: "clientId",
    fields: CLIENT_STATS_FIELDS,
    includes: &[],
    soft_delete: false,
    versioned: false,
};

impl Entity for ClientStats {
    type Link = NoLink;

    fn schema() -> &'static EntitySchema {
        &CLIENT_STATS_SCHEMA
    }

    fn id(&self) -> i64 {
        self.client_id
    }

    fn set_id(&mut self, id: i64) {
        self.client_id = id;
    }

    fn strip_navigation(&mut self) {}
}
