//! Projects owned by clients.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use shared::concurrency::ConcurrencyToken;
use std::str::FromStr;
use validator::{Validate, ValidationError};

use super::client::Client;
use super::entity::{ChangeTracked, Entity, EntitySchema, FieldDef, FieldKind, NoLink};
use super::tracked_change::TrackedChange;

/// Lifecycle state of a project, ordered as declared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProjectState {
    #[default]
    Open,
    OnHold,
    Closed,
}

impl ProjectState {
    pub const NAMES: &'static [&'static str] = &["Open", "OnHold", "Closed"];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectState::Open => "Open",
            ProjectState::OnHold => "OnHold",
            ProjectState::Closed => "Closed",
        }
    }
}

impl FromStr for ProjectState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(ProjectState::Open),
            "onhold" => Ok(ProjectState::OnHold),
            "closed" => Ok(ProjectState::Closed),
            _ => Err(format!("Unknown project state: {}", s)),
        }
    }
}

impl std::fmt::Display for ProjectState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_date_range"))]
pub struct Project {
    #[serde(default)]
    pub id: i64,

    #[validate(length(min = 1, max = 50, message = "Name must be between 1 and 50 characters"))]
    pub name: String,

    #[validate(range(min = 1, message = "A client is required"))]
    pub client_id: i64,

    pub start_date: NaiveDate,

    pub end_date: NaiveDate,

    #[serde(default)]
    pub state: ProjectState,

    #[serde(default)]
    pub concurrency_token: Option<ConcurrencyToken>,

    #[serde(default)]
    pub deleted: bool,

    #[serde(default)]
    pub last_modification: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<Box<Client>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tracked_changes: Vec<TrackedChange>,
}

fn validate_date_range(project: &Project) -> Result<(), ValidationError> {
    if project.end_date < project.start_date {
        let mut err = ValidationError::new("date_range");
        err.message = Some("End date cannot be before start date".into());
        return Err(err);
    }
    Ok(())
}

static PROJECT_FIELDS: &[FieldDef] = &[
    FieldDef::new("id", FieldKind::Int),
    FieldDef::new("name", FieldKind::Text),
    FieldDef::new("clientId", FieldKind::Int),
    FieldDef::new("startDate", FieldKind::Date),
    FieldDef::new("endDate", FieldKind::Date),
    FieldDef::new("state", FieldKind::Enum(ProjectState::NAMES)),
    FieldDef::new("deleted", FieldKind::Bool),
    FieldDef::nullable("lastModification", FieldKind::Timestamp),
];

static PROJECT_SCHEMA: EntitySchema = EntitySchema {
    resource: "projects",
    entity_name: "Project",
    id_field: "id",
    fields: PROJECT_FIELDS,
    includes: &["client", "trackedChanges"],
    soft_delete: true,
    versioned: true,
};

impl Entity for Project {
    type Link = NoLink;

    fn schema() -> &'static EntitySchema {
        &PROJECT_SCHEMA
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
        self.client = None;
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

impl ChangeTracked for Project {
    fn set_last_modification(&mut self, at: DateTime<Utc>) {
        self.last_modification = Some(at);
    }
}
