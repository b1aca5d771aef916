//! Client, project and client statistics entities (database row mappings).

use chrono::{DateTime, NaiveDate, Utc};
use shared::concurrency::ConcurrencyToken;
use sqlx::FromRow;

use domain::models::{Client, ClientStats, Project, ProjectState};

/// Database row mapping for the clients table.
#[derive(Debug, Clone, FromRow)]
pub struct ClientEntity {
    pub id: i64,
    pub name: String,
    pub abbreviation: String,
    pub deleted: bool,
    pub last_modification: Option<DateTime<Utc>>,
    pub version: i64,
}

impl From<ClientEntity> for Client {
    fn from(entity: ClientEntity) -> Self {
        Self {
            id: entity.id,
            name: entity.name,
            abbreviation: entity.abbreviation,
            concurrency_token: Some(ConcurrencyToken::from_version(entity.version)),
            deleted: entity.deleted,
            last_modification: entity.last_modification,
            ..Default::default()
        }
    }
}

/// Database row mapping for the projects table. `state` holds the
/// declaration ordinal of [`ProjectState`].
#[derive(Debug, Clone, FromRow)]
pub struct ProjectEntity {
    pub id: i64,
    pub name: String,
    pub client_id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub state: i16,
    pub deleted: bool,
    pub last_modification: Option<DateTime<Utc>>,
    pub version: i64,
}

pub fn state_ordinal(state: ProjectState) -> i16 {
    state as i16
}

fn state_from_ordinal(ordinal: i16) -> ProjectState {
    usize::try_from(ordinal)
        .ok()
        .and_then(|i| ProjectState::NAMES.get(i))
        .and_then(|name| name.parse().ok())
        .unwrap_or_default()
}

impl From<ProjectEntity> for Project {
    fn from(entity: ProjectEntity) -> Self {
        Self {
            id: entity.id,
            name: entity.name,
            client_id: entity.client_id,
            start_date: entity.start_date,
            end_date: entity.end_date,
            state: state_from_ordinal(entity.state),
            concurrency_token: Some(ConcurrencyToken::from_version(entity.version)),
            deleted: entity.deleted,
            last_modification: entity.last_modification,
            client: None,
            tracked_changes: Vec::new(),
        }
    }
}

/// Database row mapping for the client_stats view.
#[derive(Debug, Clone, FromRow)]
pub struct ClientStatsEntity {
    pub client_id: i64,
    pub number_of_projects: i64,
    pub first_start_date: Option<NaiveDate>,
    pub last_end_date: Option<NaiveDate>,
}

impl From<ClientStatsEntity> for ClientStats {
    fn from(entity: ClientStatsEntity) -> Self {
        Self {
            client_id: entity.client_id,
            number_of_projects: entity.number_of_projects,
            first_start_date: entity.first_start_date,
            last_end_date: entity.last_end_date,
        }
    }
}
