//! In-memory implementation of every persistence port.
//!
//! Backs the unit tests and the api's test harness. All tables live behind a
//! single lock; a commit applies its change set to a copy of the tables and
//! swaps it in only when every step succeeded, so a failed write leaves
//! nothing behind.

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use serde_json::Value;
use shared::concurrency::ConcurrencyToken;
use shared::password::hash_password;
use std::cmp::Ordering;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{ServiceError, StoreError};
use crate::models::{
    normalize_name, roles, AllowedToken, ApplicationRole, ApplicationUser, ApplicationUserRole,
    Client, ClientStats, ContentBlock, Entity, ExternalCredential, Job, JobItem, NewUser,
    PasswordReset, Project, ProjectState, TrackedChange,
};
use crate::ports::{
    ChangeKind, ChangeSet, Clock, DataContext, EntityStore, FixedClock, LinkOp, MailMessage,
    Mailer, UserDirectory,
};
use crate::query::{EntityQuery, Literal, SortKey};
use crate::services::access::Caller;

/// Password of every seeded user.
pub const SEED_PASSWORD: &str = "Passw0rd!";

/// User name and role of every seeded user. `guest` has no role.
const SEED_USERS: &[(&str, Option<&str>)] = &[
    ("admin", Some(roles::SUPER_ADMIN)),
    ("manager", Some(roles::PROJECT_MANAGER)),
    ("viewer", Some(roles::PROJECT_VIEWER)),
    ("editor", Some(roles::CONTENT_MANAGER)),
    ("guest", None),
];

fn seed_password_hash() -> Option<String> {
    static HASH: OnceLock<Option<String>> = OnceLock::new();
    HASH.get_or_init(|| hash_password(SEED_PASSWORD).ok())
        .clone()
}

/// The tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryDb {
    users: Vec<ApplicationUser>,
    roles: Vec<ApplicationRole>,
    user_roles: Vec<ApplicationUserRole>,
    credentials: Vec<ExternalCredential>,
    password_resets: Vec<(i64, PasswordReset)>,
    clients: Vec<Client>,
    client_changes: Vec<TrackedChange>,
    projects: Vec<Project>,
    project_changes: Vec<TrackedChange>,
    content_blocks: Vec<ContentBlock>,
    jobs: Vec<Job>,
    job_items: Vec<JobItem>,
}

fn next_id<T>(rows: &[T], id: impl Fn(&T) -> i64) -> i64 {
    rows.iter().map(id).max().unwrap_or(0) + 1
}

impl MemoryDb {
    fn client_stats(&self) -> Vec<ClientStats> {
        self.clients
            .iter()
            .map(|client| {
                let live: Vec<&Project> = self
                    .projects
                    .iter()
                    .filter(|p| p.client_id == client.id && !p.deleted)
                    .collect();
                ClientStats {
                    client_id: client.id,
                    number_of_projects: live.len() as i64,
                    first_start_date: live.iter().map(|p| p.start_date).min(),
                    last_end_date: live.iter().map(|p| p.end_date).max(),
                }
            })
            .collect()
    }

    fn role_memberships(&self, user_id: i64) -> Vec<ApplicationUserRole> {
        let mut memberships: Vec<ApplicationUserRole> = self
            .user_roles
            .iter()
            .filter(|m| m.application_user_id == user_id)
            .cloned()
            .map(|mut m| {
                m.role_name = self
                    .roles
                    .iter()
                    .find(|r| r.id == m.application_role_id)
                    .map(|r| r.name.clone());
                m
            })
            .collect();
        memberships.sort_by_key(|m| m.application_role_id);
        memberships
    }

    fn check_unique_user(&self, id: i64, user_name: &str, email: &str) -> Result<(), StoreError> {
        let user_name = normalize_name(user_name);
        let email = normalize_name(email);
        for other in self.users.iter().filter(|u| u.id != id) {
            if other.normalized_user_name == user_name {
                return Err(StoreError::Duplicate("userName".to_string()));
            }
            if other.normalized_email == email {
                return Err(StoreError::Duplicate("email".to_string()));
            }
        }
        Ok(())
    }

    fn insert_user(&mut self, user: NewUser) -> Result<ApplicationUser, StoreError> {
        self.check_unique_user(0, &user.user_name, &user.email)?;
        let mut row = ApplicationUser {
            id: next_id(&self.users, |u| u.id),
            user_name: user.user_name,
            email: user.email,
            email_confirmed: user.email_confirmed,
            first_name: user.first_name,
            last_name: user.last_name,
            password_hash: user.password_hash,
            concurrency_token: Some(ConcurrencyToken::from_version(1)),
            ..Default::default()
        };
        row.normalize();
        self.users.push(row.clone());
        Ok(row)
    }

    fn seed() -> Self {
        let mut db = MemoryDb::default();
        let token = || Some(ConcurrencyToken::from_version(1));
        let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default();

        for (index, name) in roles::ALL.iter().enumerate() {
            db.roles.push(ApplicationRole {
                id: index as i64 + 1,
                name: name.to_string(),
                normalized_name: normalize_name(name),
                concurrency_token: token(),
            });
        }

        let password_hash = seed_password_hash();
        for (user_name, role) in SEED_USERS {
            let inserted = db.insert_user(NewUser {
                user_name: user_name.to_string(),
                email: format!("{}@example.com", user_name),
                first_name: String::new(),
                last_name: String::new(),
                password_hash: password_hash.clone(),
                email_confirmed: true,
            });
            let (Ok(user), Some(role)) = (inserted, role) else {
                continue;
            };
            let role_id = db.roles.iter().find(|r| r.name == *role).map_or(0, |r| r.id);
            db.user_roles.push(ApplicationUserRole {
                id: next_id(&db.user_roles, |m| m.id),
                application_user_id: user.id,
                application_role_id: role_id,
                role_name: None,
            });
        }

        for (id, name, abbreviation) in [(1, "Acme, Inc.", "ACME"), (2, "Northwoods", "NWS")] {
            db.clients.push(Client {
                id,
                name: name.to_string(),
                abbreviation: abbreviation.to_string(),
                concurrency_token: token(),
                ..Default::default()
            });
        }

        let projects = [
            (1, "Roadrunner", 1, date(2020, 1, 6), date(2025, 12, 19), ProjectState::Open),
            (2, "Rapidest", 1, date(2016, 9, 1), date(2019, 3, 30), ProjectState::Closed),
            (3, "Timberline", 2, date(2021, 4, 12), date(2026, 6, 30), ProjectState::Open),
            (4, "Lumberjack", 2, date(2022, 2, 1), date(2024, 11, 29), ProjectState::OnHold),
        ];
        for (id, name, client_id, start_date, end_date, state) in projects {
            db.projects.push(Project {
                id,
                name: name.to_string(),
                client_id,
                start_date,
                end_date,
                state,
                concurrency_token: token(),
                ..Default::default()
            });
        }

        db.content_blocks.push(ContentBlock {
            id: 1,
            slug: "welcome-email".to_string(),
            is_page: false,
            description: "Sent after registration".to_string(),
            title: "Welcome, %firstName%!".to_string(),
            value: "Hello %firstName%, your account is ready.".to_string(),
            allowed_tokens: vec![AllowedToken {
                token: "firstName".to_string(),
                description: "First name of the recipient".to_string(),
            }],
            concurrency_token: token(),
        });
        db.content_blocks.push(ContentBlock {
            id: 2,
            slug: "about".to_string(),
            is_page: true,
            description: "About page".to_string(),
            title: "About us".to_string(),
            value: "We manage clients and projects.".to_string(),
            allowed_tokens: Vec::new(),
            concurrency_token: token(),
        });
        db.content_blocks.push(ContentBlock {
            id: 3,
            slug: "password-reset-email".to_string(),
            is_page: false,
            description: "Sent when a password reset is requested".to_string(),
            title: "Reset your password".to_string(),
            value: "Follow this link to choose a new password: %passwordResetUrl%".to_string(),
            allowed_tokens: vec![AllowedToken {
                token: "passwordResetUrl".to_string(),
                description: "Link that opens the reset form".to_string(),
            }],
            concurrency_token: token(),
        });

        db.jobs.push(Job {
            id: 1,
            name: "Nightly export".to_string(),
            created: Some(seed_instant()),
            updated: Some(seed_instant()),
            expected_count: 4,
            item_type: "Project".to_string(),
            item_ids: vec![1, 2, 3, 4],
            concurrency_token: token(),
            ..Default::default()
        });

        db
    }
}

fn seed_instant() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0)
        .single()
        .unwrap_or_default()
}

/// How an entity type maps onto the in-memory tables.
pub trait MemoryTable: Entity {
    /// Current rows, without related data.
    fn rows(db: &MemoryDb) -> Vec<Self>;

    /// Mutable rows; `None` for read-only views.
    fn rows_mut(db: &mut MemoryDb) -> Option<&mut Vec<Self>>;

    fn attach(_db: &MemoryDb, _entity: &mut Self, _include: &str) {}

    fn tracked_changes(_db: &mut MemoryDb) -> Option<&mut Vec<TrackedChange>> {
        None
    }

    /// Foreign key and unique constraints.
    fn check_constraints(_db: &MemoryDb, _entity: &Self) -> Result<(), StoreError> {
        Ok(())
    }

    fn apply_links(
        _db: &mut MemoryDb,
        _parent_id: i64,
        _links: Vec<LinkOp<Self::Link>>,
    ) -> Result<(), StoreError> {
        Ok(())
    }

    /// Removes the rows depending on a physically deleted row.
    fn cascade_delete(_db: &mut MemoryDb, _id: i64) {}
}

impl MemoryTable for ApplicationUser {
    fn rows(db: &MemoryDb) -> Vec<Self> {
        db.users.clone()
    }

    fn rows_mut(db: &mut MemoryDb) -> Option<&mut Vec<Self>> {
        Some(&mut db.users)
    }

    fn attach(db: &MemoryDb, entity: &mut Self, include: &str) {
        match include {
            "roles" => entity.roles = Some(db.role_memberships(entity.id)),
            "externalCredentials" => {
                entity.external_credentials = db
                    .credentials
                    .iter()
                    .filter(|c| c.application_user_id == entity.id)
                    .cloned()
                    .collect()
            }
            _ => {}
        }
    }

    fn check_constraints(db: &MemoryDb, entity: &Self) -> Result<(), StoreError> {
        db.check_unique_user(entity.id, &entity.user_name, &entity.email)
    }

    fn apply_links(
        db: &mut MemoryDb,
        parent_id: i64,
        links: Vec<LinkOp<ApplicationUserRole>>,
    ) -> Result<(), StoreError> {
        for op in links {
            match op {
                LinkOp::Delete(id) => db
                    .user_roles
                    .retain(|m| !(m.id == id && m.application_user_id == parent_id)),
                LinkOp::Insert(mut membership) => {
                    if !db.roles.iter().any(|r| r.id == membership.application_role_id) {
                        return Err(StoreError::InvalidReference("roles".to_string()));
                    }
                    if db.user_roles.iter().any(|m| {
                        m.application_user_id == parent_id
                            && m.application_role_id == membership.application_role_id
                    }) {
                        return Err(StoreError::Duplicate("roles".to_string()));
                    }
                    membership.id = next_id(&db.user_roles, |m| m.id);
                    membership.application_user_id = parent_id;
                    membership.role_name = None;
                    db.user_roles.push(membership);
                }
            }
        }
        Ok(())
    }

    fn cascade_delete(db: &mut MemoryDb, id: i64) {
        db.user_roles.retain(|m| m.application_user_id != id);
        db.credentials.retain(|c| c.application_user_id != id);
    }
}

impl MemoryTable for ApplicationRole {
    fn rows(db: &MemoryDb) -> Vec<Self> {
        db.roles.clone()
    }

    fn rows_mut(db: &mut MemoryDb) -> Option<&mut Vec<Self>> {
        Some(&mut db.roles)
    }

    fn check_constraints(db: &MemoryDb, entity: &Self) -> Result<(), StoreError> {
        let name = normalize_name(&entity.name);
        if db
            .roles
            .iter()
            .any(|r| r.id != entity.id && r.normalized_name == name)
        {
            return Err(StoreError::Duplicate("name".to_string()));
        }
        Ok(())
    }

    fn cascade_delete(db: &mut MemoryDb, id: i64) {
        db.user_roles.retain(|m| m.application_role_id != id);
    }
}

impl MemoryTable for Client {
    fn rows(db: &MemoryDb) -> Vec<Self> {
        db.clients.clone()
    }

    fn rows_mut(db: &mut MemoryDb) -> Option<&mut Vec<Self>> {
        Some(&mut db.clients)
    }

    fn attach(db: &MemoryDb, entity: &mut Self, include: &str) {
        match include {
            "projects" => {
                entity.projects = db
                    .projects
                    .iter()
                    .filter(|p| p.client_id == entity.id && !p.deleted)
                    .cloned()
                    .collect()
            }
            "clientStats" => {
                entity.client_stats = db
                    .client_stats()
                    .into_iter()
                    .find(|s| s.client_id == entity.id)
            }
            "trackedChanges" => {
                entity.tracked_changes = db
                    .client_changes
                    .iter()
                    .filter(|c| c.entity_id == entity.id)
                    .cloned()
                    .collect()
            }
            _ => {}
        }
    }

    fn tracked_changes(db: &mut MemoryDb) -> Option<&mut Vec<TrackedChange>> {
        Some(&mut db.client_changes)
    }

    fn cascade_delete(db: &mut MemoryDb, id: i64) {
        let project_ids: Vec<i64> = db
            .projects
            .iter()
            .filter(|p| p.client_id == id)
            .map(|p| p.id)
            .collect();
        for project_id in project_ids {
            Project::cascade_delete(db, project_id);
        }
        db.projects.retain(|p| p.client_id != id);
        db.client_changes.retain(|c| c.entity_id != id);
    }
}

impl MemoryTable for Project {
    fn rows(db: &MemoryDb) -> Vec<Self> {
        db.projects.clone()
    }

    fn rows_mut(db: &mut MemoryDb) -> Option<&mut Vec<Self>> {
        Some(&mut db.projects)
    }

    fn attach(db: &MemoryDb, entity: &mut Self, include: &str) {
        match include {
            "client" => {
                entity.client = db
                    .clients
                    .iter()
                    .find(|c| c.id == entity.client_id)
                    .cloned()
                    .map(Box::new)
            }
            "trackedChanges" => {
                entity.tracked_changes = db
                    .project_changes
                    .iter()
                    .filter(|c| c.entity_id == entity.id)
                    .cloned()
                    .collect()
            }
            _ => {}
        }
    }

    fn tracked_changes(db: &mut MemoryDb) -> Option<&mut Vec<TrackedChange>> {
        Some(&mut db.project_changes)
    }

    fn check_constraints(db: &MemoryDb, entity: &Self) -> Result<(), StoreError> {
        if !db.clients.iter().any(|c| c.id == entity.client_id) {
            return Err(StoreError::InvalidReference("clientId".to_string()));
        }
        Ok(())
    }

    fn cascade_delete(db: &mut MemoryDb, id: i64) {
        db.project_changes.retain(|c| c.entity_id != id);
    }
}

impl MemoryTable for ClientStats {
    fn rows(db: &MemoryDb) -> Vec<Self> {
        db.client_stats()
    }

    fn rows_mut(_db: &mut MemoryDb) -> Option<&mut Vec<Self>> {
        None
    }
}

impl MemoryTable for ContentBlock {
    fn rows(db: &MemoryDb) -> Vec<Self> {
        db.content_blocks.clone()
    }

    fn rows_mut(db: &mut MemoryDb) -> Option<&mut Vec<Self>> {
        Some(&mut db.content_blocks)
    }

    fn check_constraints(db: &MemoryDb, entity: &Self) -> Result<(), StoreError> {
        if db
            .content_blocks
            .iter()
            .any(|b| b.id != entity.id && b.slug == entity.slug)
        {
            return Err(StoreError::Duplicate("slug".to_string()));
        }
        Ok(())
    }
}

impl MemoryTable for Job {
    fn rows(db: &MemoryDb) -> Vec<Self> {
        db.jobs.clone()
    }

    fn rows_mut(db: &mut MemoryDb) -> Option<&mut Vec<Self>> {
        Some(&mut db.jobs)
    }

    fn attach(db: &MemoryDb, entity: &mut Self, include: &str) {
        if include == "jobItems" {
            entity.job_items = db
                .job_items
                .iter()
                .filter(|i| i.job_id == entity.id)
                .cloned()
                .collect();
        }
    }

    fn cascade_delete(db: &mut MemoryDb, id: i64) {
        db.job_items.retain(|i| i.job_id != id);
    }
}

impl MemoryTable for JobItem {
    fn rows(db: &MemoryDb) -> Vec<Self> {
        db.job_items.clone()
    }

    fn rows_mut(db: &mut MemoryDb) -> Option<&mut Vec<Self>> {
        Some(&mut db.job_items)
    }

    fn check_constraints(db: &MemoryDb, entity: &Self) -> Result<(), StoreError> {
        if !db.jobs.iter().any(|j| j.id == entity.job_id) {
            return Err(StoreError::InvalidReference("jobId".to_string()));
        }
        Ok(())
    }
}

type SharedDb = Arc<RwLock<MemoryDb>>;

fn read(db: &SharedDb) -> RwLockReadGuard<'_, MemoryDb> {
    db.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(db: &SharedDb) -> RwLockWriteGuard<'_, MemoryDb> {
    db.write().unwrap_or_else(PoisonError::into_inner)
}

fn to_json<E: Entity>(entity: &E) -> Result<Value, StoreError> {
    serde_json::to_value(entity).map_err(|e| StoreError::Database(e.to_string()))
}

/// Orders two rows by one key. Nulls sort last, as in PostgreSQL.
fn compare_key(key: &SortKey, a: &Value, b: &Value) -> Ordering {
    let value = |item: &Value| {
        item.get(key.field.name)
            .and_then(|v| Literal::from_json(key.field.kind, v))
    };
    let ordering = match (value(a), value(b)) {
        (Some(a), Some(b)) => a.compare(&b).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    if key.descending {
        ordering.reverse()
    } else {
        ordering
    }
}

fn matching_rows<E: MemoryTable>(
    db: &MemoryDb,
    query: &EntityQuery,
) -> Result<Vec<(Value, E)>, StoreError> {
    let mut rows = Vec::new();
    for row in E::rows(db) {
        let json = to_json(&row)?;
        if query.predicate.as_ref().map_or(true, |p| p.matches(&json)) {
            rows.push((json, row));
        }
    }
    Ok(rows)
}

pub struct MemoryStore<E> {
    db: SharedDb,
    _entity: PhantomData<fn() -> E>,
}

impl<E> MemoryStore<E> {
    fn new(db: SharedDb) -> Self {
        Self {
            db,
            _entity: PhantomData,
        }
    }
}

impl<E: MemoryTable> MemoryStore<E> {
    fn apply(db: &mut MemoryDb, changes: ChangeSet<E>) -> Result<E, StoreError> {
        let schema = E::schema();
        let ChangeSet {
            mut entity,
            kind,
            tracked_change,
            links,
        } = changes;

        E::check_constraints(db, &entity)?;
        let rows = E::rows_mut(db).ok_or(StoreError::ReadOnly(schema.entity_name))?;

        match kind {
            ChangeKind::Insert => {
                entity.set_id(next_id(rows.as_slice(), |r: &E| r.id()));
                if schema.versioned {
                    entity.set_concurrency_token(ConcurrencyToken::from_version(1));
                }
                rows.push(entity.clone());
            }
            ChangeKind::Update => {
                let row = rows
                    .iter_mut()
                    .find(|r| r.id() == entity.id())
                    .ok_or(StoreError::NotFound)?;
                if schema.versioned {
                    let next = match (row.concurrency_token(), entity.concurrency_token()) {
                        (Some(stored), Some(submitted)) if stored == submitted => stored.next(),
                        _ => None,
                    }
                    .ok_or(StoreError::Conflict)?;
                    entity.set_concurrency_token(next);
                }
                *row = entity.clone();
            }
        }

        if let Some(mut change) = tracked_change {
            let changes = E::tracked_changes(db)
                .ok_or_else(|| StoreError::Database(format!("{} is not tracked", schema.entity_name)))?;
            change.id = next_id(changes, |c| c.id);
            change.entity_id = entity.id();
            changes.push(change);
        }

        E::apply_links(db, entity.id(), links)?;
        Ok(entity)
    }
}

#[async_trait]
impl<E: MemoryTable> EntityStore<E> for MemoryStore<E> {
    async fn fetch(&self, query: &EntityQuery) -> Result<Vec<E>, StoreError> {
        let db = read(&self.db);
        let mut rows = matching_rows::<E>(&db, query)?;

        rows.sort_by(|(a, row_a), (b, row_b)| {
            query
                .sort
                .iter()
                .map(|key| compare_key(key, a, b))
                .find(|o| o.is_ne())
                .unwrap_or_else(|| row_a.id().cmp(&row_b.id()))
        });

        let offset = usize::try_from(query.offset).unwrap_or(0);
        let limit = query
            .limit
            .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(0));

        Ok(rows
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(_, mut item)| {
                for include in &query.includes {
                    E::attach(&db, &mut item, include);
                }
                item
            })
            .collect())
    }

    async fn count(&self, query: &EntityQuery, cap: Option<i64>) -> Result<i64, StoreError> {
        let db = read(&self.db);
        let total = matching_rows::<E>(&db, query)?.len() as i64;
        Ok(cap.map_or(total, |cap| total.min(cap.max(0))))
    }

    async fn commit(&self, changes: ChangeSet<E>) -> Result<E, StoreError> {
        let mut db = write(&self.db);
        let mut staged = db.clone();
        let saved = Self::apply(&mut staged, changes)?;
        *db = staged;
        Ok(saved)
    }

    async fn delete(&self, id: i64, soft: bool) -> Result<(), StoreError> {
        let mut db = write(&self.db);
        let schema = E::schema();
        let rows = E::rows_mut(&mut db).ok_or(StoreError::ReadOnly(schema.entity_name))?;
        let index = rows
            .iter()
            .position(|r| r.id() == id)
            .ok_or(StoreError::NotFound)?;

        if soft {
            let row = &mut rows[index];
            row.set_deleted(true);
            if let Some(next) = row.concurrency_token().and_then(ConcurrencyToken::next) {
                row.set_concurrency_token(next);
            }
        } else {
            rows.remove(index);
            E::cascade_delete(&mut db, id);
        }
        Ok(())
    }
}

pub struct MemoryUserDirectory {
    db: SharedDb,
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn find_user(&self, id: i64) -> Result<Option<ApplicationUser>, StoreError> {
        Ok(read(&self.db).users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_user_name(
        &self,
        normalized_user_name: &str,
    ) -> Result<Option<ApplicationUser>, StoreError> {
        Ok(read(&self.db)
            .users
            .iter()
            .find(|u| u.normalized_user_name == normalized_user_name)
            .cloned())
    }

    async fn find_by_email(
        &self,
        normalized_email: &str,
    ) -> Result<Option<ApplicationUser>, StoreError> {
        Ok(read(&self.db)
            .users
            .iter()
            .find(|u| u.normalized_email == normalized_email)
            .cloned())
    }

    async fn roles_of(&self, user_id: i64) -> Result<Vec<String>, StoreError> {
        Ok(read(&self.db)
            .role_memberships(user_id)
            .into_iter()
            .filter_map(|m| m.role_name)
            .collect())
    }

    async fn user_roles(&self, user_id: i64) -> Result<Vec<ApplicationUserRole>, StoreError> {
        Ok(read(&self.db).role_memberships(user_id))
    }

    async fn find_external_credential(
        &self,
        provider: &str,
        external_id: &str,
    ) -> Result<Option<ExternalCredential>, StoreError> {
        Ok(read(&self.db)
            .credentials
            .iter()
            .find(|c| c.provider == provider && c.external_id == external_id)
            .cloned())
    }

    async fn external_credentials(
        &self,
        user_id: i64,
    ) -> Result<Vec<ExternalCredential>, StoreError> {
        Ok(read(&self.db)
            .credentials
            .iter()
            .filter(|c| c.application_user_id == user_id)
            .cloned()
            .collect())
    }

    async fn create_user(
        &self,
        user: NewUser,
        credential: Option<ExternalCredential>,
    ) -> Result<ApplicationUser, StoreError> {
        let mut db = write(&self.db);
        let mut staged = db.clone();
        let created = staged.insert_user(user)?;

        if let Some(mut credential) = credential {
            if staged.credentials.iter().any(|c| {
                c.provider == credential.provider && c.external_id == credential.external_id
            }) {
                return Err(StoreError::Duplicate("externalId".to_string()));
            }
            credential.id = next_id(&staged.credentials, |c| c.id);
            credential.application_user_id = created.id;
            staged.credentials.push(credential);
        }

        *db = staged;
        Ok(created)
    }

    async fn set_password_hash(&self, user_id: i64, password_hash: &str) -> Result<(), StoreError> {
        let mut db = write(&self.db);
        let user = db
            .users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or(StoreError::NotFound)?;
        user.password_hash = Some(password_hash.to_string());
        if let Some(next) = user.concurrency_token.as_ref().and_then(ConcurrencyToken::next) {
            user.concurrency_token = Some(next);
        }
        db.password_resets.retain(|(id, _)| *id != user_id);
        Ok(())
    }

    async fn set_password_reset(
        &self,
        user_id: i64,
        reset: &PasswordReset,
    ) -> Result<(), StoreError> {
        let mut db = write(&self.db);
        if !db.users.iter().any(|u| u.id == user_id) {
            return Err(StoreError::NotFound);
        }
        db.password_resets.retain(|(id, _)| *id != user_id);
        db.password_resets.push((user_id, reset.clone()));
        Ok(())
    }

    async fn password_reset(&self, user_id: i64) -> Result<Option<PasswordReset>, StoreError> {
        Ok(read(&self.db)
            .password_resets
            .iter()
            .find(|(id, _)| *id == user_id)
            .map(|(_, reset)| reset.clone()))
    }

    async fn clear_password_reset(&self, user_id: i64) -> Result<(), StoreError> {
        write(&self.db)
            .password_resets
            .retain(|(id, _)| *id != user_id);
        Ok(())
    }
}

/// Keeps every message instead of sending it.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<MailMessage>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<MailMessage> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: MailMessage) -> Result<(), ServiceError> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
        Ok(())
    }
}

/// A data context over in-memory tables with a clock that only moves when
/// told to. Clones share the same tables.
#[derive(Clone)]
pub struct MemoryDataContext {
    db: SharedDb,
    clock: Arc<FixedClock>,
}

impl MemoryDataContext {
    pub fn empty() -> Self {
        Self {
            db: Arc::new(RwLock::new(MemoryDb::default())),
            clock: Arc::new(FixedClock::new(seed_instant())),
        }
    }

    /// Roles, one user per role plus `guest`, two clients with four
    /// projects, three content blocks and one job.
    pub fn seeded() -> Self {
        Self {
            db: Arc::new(RwLock::new(MemoryDb::seed())),
            clock: Arc::new(FixedClock::new(seed_instant())),
        }
    }

    pub fn fixed_clock(&self) -> &FixedClock {
        &self.clock
    }

    /// The first seeded user holding `role`, anonymous when there is none.
    pub fn seeded_user(&self, role: &str) -> Caller {
        let db = read(&self.db);
        db.users
            .iter()
            .find(|u| {
                db.role_memberships(u.id)
                    .iter()
                    .any(|m| m.role_name.as_deref() == Some(role))
            })
            .map_or_else(Caller::anonymous, |u| Caller::user(u.id))
    }

    /// A signed-in user without any role.
    pub fn seeded_user_without_roles(&self) -> Caller {
        let db = read(&self.db);
        db.users
            .iter()
            .find(|u| db.role_memberships(u.id).is_empty())
            .map_or_else(Caller::anonymous, |u| Caller::user(u.id))
    }

    pub fn role_id(&self, name: &str) -> i64 {
        read(&self.db)
            .roles
            .iter()
            .find(|r| r.name == name)
            .map_or(0, |r| r.id)
    }

    /// Audit rows of one entity, oldest first.
    pub fn tracked_changes_of<E: MemoryTable>(&self, id: i64) -> Vec<TrackedChange> {
        let mut db = write(&self.db);
        let mut changes: Vec<TrackedChange> = E::tracked_changes(&mut db)
            .map(|rows| rows.iter().filter(|c| c.entity_id == id).cloned().collect())
            .unwrap_or_default();
        changes.sort_by_key(|c| c.id);
        changes
    }

    fn store<E: MemoryTable>(&self) -> Arc<dyn EntityStore<E>> {
        Arc::new(MemoryStore::<E>::new(Arc::clone(&self.db)))
    }
}

#[async_trait]
impl DataContext for MemoryDataContext {
    fn application_users(&self) -> Arc<dyn EntityStore<ApplicationUser>> {
        self.store()
    }

    fn application_roles(&self) -> Arc<dyn EntityStore<ApplicationRole>> {
        self.store()
    }

    fn clients(&self) -> Arc<dyn EntityStore<Client>> {
        self.store()
    }

    fn projects(&self) -> Arc<dyn EntityStore<Project>> {
        self.store()
    }

    fn client_stats(&self) -> Arc<dyn EntityStore<ClientStats>> {
        self.store()
    }

    fn content_blocks(&self) -> Arc<dyn EntityStore<ContentBlock>> {
        self.store()
    }

    fn jobs(&self) -> Arc<dyn EntityStore<Job>> {
        self.store()
    }

    fn job_items(&self) -> Arc<dyn EntityStore<JobItem>> {
        self.store()
    }

    fn users(&self) -> Arc<dyn UserDirectory> {
        Arc::new(MemoryUserDirectory {
            db: Arc::clone(&self.db),
        })
    }

    fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    async fn health(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{CompareOp, Predicate};

    fn by_name(name: &str) -> EntityQuery {
        let schema = Client::schema();
        EntityQuery::new().and_where(Predicate::Compare {
            field: schema.field("name").unwrap(),
            op: CompareOp::Eq,
            value: Literal::Text(name.to_string()),
        })
    }

    #[tokio::test]
    async fn test_seed_contents() {
        let ctx = MemoryDataContext::seeded();
        assert_eq!(ctx.projects().count(&EntityQuery::new(), None).await.unwrap(), 4);
        assert_eq!(ctx.clients().count(&by_name("Northwoods"), None).await.unwrap(), 1);
        assert_eq!(ctx.role_id(roles::SUPER_ADMIN), 1);
        assert!(ctx.seeded_user(roles::CONTENT_MANAGER).user_id.is_some());
        assert!(ctx.seeded_user_without_roles().user_id.is_some());
    }

    #[tokio::test]
    async fn test_versioned_update_requires_current_token() {
        let ctx = MemoryDataContext::seeded();
        let store = ctx.clients();
        let mut acme = store.fetch(&by_name("Acme, Inc.")).await.unwrap().remove(0);

        acme.abbreviation = "AC".to_string();
        let saved = store
            .commit(ChangeSet::new(acme.clone(), ChangeKind::Update))
            .await
            .unwrap();
        assert_eq!(
            saved.concurrency_token.as_ref().and_then(ConcurrencyToken::version),
            Some(2)
        );

        let err = store
            .commit(ChangeSet::new(acme, ChangeKind::Update))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
    }

    #[tokio::test]
    async fn test_failed_commit_changes_nothing() {
        let ctx = MemoryDataContext::seeded();
        let mut changes = ChangeSet::new(
            Client {
                name: "Half written".to_string(),
                ..Default::default()
            },
            ChangeKind::Insert,
        );
        changes.tracked_change = Some(TrackedChange::staged(
            seed_instant(),
            None,
            None,
            Value::Null,
        ));
        ctx.clients().commit(changes).await.unwrap();

        let project = Project {
            name: "Dangling".to_string(),
            client_id: 404,
            ..Default::default()
        };
        let err = ctx
            .projects()
            .commit(ChangeSet::new(project, ChangeKind::Insert))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidReference(_)));
        assert_eq!(ctx.projects().count(&EntityQuery::new(), None).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_client_stats_view_is_read_only() {
        let ctx = MemoryDataContext::seeded();
        let stats = ctx.client_stats().fetch(&EntityQuery::new()).await.unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(
            stats[0].first_start_date,
            NaiveDate::from_ymd_opt(2016, 9, 1)
        );

        let err = ctx
            .client_stats()
            .commit(ChangeSet::new(stats[0].clone(), ChangeKind::Update))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ReadOnly(_)));
    }

    #[tokio::test]
    async fn test_hard_delete_cascades() {
        let ctx = MemoryDataContext::seeded();
        ctx.clients().delete(2, false).await.unwrap();

        let schema = Project::schema();
        let query = EntityQuery::new().and_where(Predicate::Compare {
            field: schema.field("clientId").unwrap(),
            op: CompareOp::Eq,
            value: Literal::Int(2),
        });
        assert_eq!(ctx.projects().count(&query, None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sort_puts_nulls_last_and_breaks_ties_by_id() {
        let ctx = MemoryDataContext::seeded();
        let schema = Project::schema();
        let mut query = EntityQuery::new();
        query.sort = vec![SortKey {
            field: schema.field("lastModification").unwrap(),
            descending: false,
        }];

        let ids: Vec<i64> = ctx
            .projects()
            .fetch(&query)
            .await
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_duplicate_user_name_is_rejected() {
        let ctx = MemoryDataContext::seeded();
        let err = ctx
            .users()
            .create_user(
                NewUser {
                    user_name: "ADMIN".to_string(),
                    email: "someone@example.com".to_string(),
                    first_name: String::new(),
                    last_name: String::new(),
                    password_hash: None,
                    email_confirmed: false,
                },
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }
}
