//! Table bindings for every managed entity.

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;

use domain::models::{
    normalize_name, ApplicationRole, ApplicationUser, ApplicationUserRole, Client, ClientStats,
    ContentBlock, ExternalCredential, Job, JobItem, Project, TrackedChange,
};
use domain::ports::LinkOp;
use domain::StoreError;

use super::PgTable;
use crate::entities::{
    state_ordinal, ApplicationRoleEntity, ApplicationUserEntity, ApplicationUserRoleEntity,
    ClientEntity, ClientStatsEntity, ContentBlockEntity, ExternalCredentialEntity, JobEntity,
    JobItemEntity, ProjectEntity, TrackedChangeEntity,
};
use crate::error::map_sqlx_error;

const USER_COLUMNS: &str = "id, user_name, normalized_user_name, email, normalized_email, \
     email_confirmed, first_name, last_name, password_hash, version";
const ROLE_COLUMNS: &str = "id, name, normalized_name, version";
const CLIENT_COLUMNS: &str = "id, name, abbreviation, deleted, last_modification, version";
const PROJECT_COLUMNS: &str =
    "id, name, client_id, start_date, end_date, state, deleted, last_modification, version";
const CLIENT_STATS_COLUMNS: &str =
    "client_id, number_of_projects, first_start_date, last_end_date";
const CONTENT_BLOCK_COLUMNS: &str =
    "id, slug, is_page, description, title, value, allowed_tokens, version";
const JOB_COLUMNS: &str = "id, name, created, started, updated, ended, expected_count, \
     success_count, failure_count, item_type, item_ids, version";
const JOB_ITEM_COLUMNS: &str = "id, job_id, item_id, timestamp, note";
const TRACKED_CHANGE_COLUMNS: &str =
    "id, entity_id, timestamp, application_user_id, old_value, new_value";

fn ids<E: PgTable>(items: &[E]) -> Vec<i64> {
    items.iter().map(|item| item.id()).collect()
}

/// Loads the audit rows of `items` from `table`, grouped by owner.
async fn tracked_changes_by_entity(
    pool: &PgPool,
    table: &str,
    entity_ids: &[i64],
) -> Result<HashMap<i64, Vec<TrackedChange>>, StoreError> {
    let sql = format!(
        "SELECT {} FROM {} WHERE entity_id = ANY($1) ORDER BY id",
        TRACKED_CHANGE_COLUMNS, table
    );
    let rows = sqlx::query_as::<_, TrackedChangeEntity>(&sql)
        .bind(entity_ids)
        .fetch_all(pool)
        .await
        .map_err(map_sqlx_error)?;

    let mut grouped: HashMap<i64, Vec<TrackedChange>> = HashMap::new();
    for row in rows {
        grouped.entry(row.entity_id).or_default().push(row.into());
    }
    Ok(grouped)
}

/// Role memberships of the given users, joined with the role names.
pub(crate) async fn memberships_of(
    pool: &PgPool,
    user_ids: &[i64],
) -> Result<Vec<ApplicationUserRole>, StoreError> {
    let rows = sqlx::query_as::<_, ApplicationUserRoleEntity>(
        r#"
        SELECT ur.id, ur.application_user_id, ur.application_role_id, r.name AS role_name
        FROM application_user_roles ur
        JOIN application_roles r ON r.id = ur.application_role_id
        WHERE ur.application_user_id = ANY($1)
        ORDER BY ur.application_role_id
        "#,
    )
    .bind(user_ids)
    .fetch_all(pool)
    .await
    .map_err(map_sqlx_error)?;

    Ok(rows.into_iter().map(Into::into).collect())
}

#[async_trait]
impl PgTable for ApplicationUser {
    type Row = ApplicationUserEntity;

    const SOURCE: &'static str = "application_users";
    const COLUMNS: &'static str = USER_COLUMNS;

    async fn insert(conn: &mut PgConnection, user: &Self) -> Result<Self, StoreError> {
        let sql = format!(
            "INSERT INTO application_users (user_name, normalized_user_name, email, \
             normalized_email, email_confirmed, first_name, last_name, password_hash) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {}",
            USER_COLUMNS
        );
        let row = sqlx::query_as::<_, ApplicationUserEntity>(&sql)
            .bind(&user.user_name)
            .bind(normalize_name(&user.user_name))
            .bind(&user.email)
            .bind(normalize_name(&user.email))
            .bind(user.email_confirmed)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.password_hash)
            .fetch_one(conn)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    // The password hash is only ever written through the user directory.
    async fn update(
        conn: &mut PgConnection,
        user: &Self,
        version: Option<i64>,
    ) -> Result<Option<Self>, StoreError> {
        let sql = format!(
            "UPDATE application_users SET user_name = $3, normalized_user_name = $4, \
             email = $5, normalized_email = $6, email_confirmed = $7, first_name = $8, \
             last_name = $9, version = version + 1 \
             WHERE id = $1 AND version = $2 RETURNING {}",
            USER_COLUMNS
        );
        let row = sqlx::query_as::<_, ApplicationUserEntity>(&sql)
            .bind(user.id)
            .bind(version)
            .bind(&user.user_name)
            .bind(normalize_name(&user.user_name))
            .bind(&user.email)
            .bind(normalize_name(&user.email))
            .bind(user.email_confirmed)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .fetch_optional(conn)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(Into::into))
    }

    async fn attach(pool: &PgPool, users: &mut [Self], include: &str) -> Result<(), StoreError> {
        let user_ids = ids(users);
        match include {
            "roles" => {
                let mut grouped: HashMap<i64, Vec<ApplicationUserRole>> = HashMap::new();
                for membership in memberships_of(pool, &user_ids).await? {
                    grouped
                        .entry(membership.application_user_id)
                        .or_default()
                        .push(membership);
                }
                for user in users.iter_mut() {
                    user.roles = Some(grouped.remove(&user.id).unwrap_or_default());
                }
            }
            "externalCredentials" => {
                let rows = sqlx::query_as::<_, ExternalCredentialEntity>(
                    r#"
                    SELECT id, application_user_id, provider, external_id
                    FROM external_credentials
                    WHERE application_user_id = ANY($1)
                    ORDER BY id
                    "#,
                )
                .bind(&user_ids)
                .fetch_all(pool)
                .await
                .map_err(map_sqlx_error)?;

                let mut grouped: HashMap<i64, Vec<ExternalCredential>> = HashMap::new();
                for row in rows {
                    grouped
                        .entry(row.application_user_id)
                        .or_default()
                        .push(row.into());
                }
                for user in users.iter_mut() {
                    user.external_credentials = grouped.remove(&user.id).unwrap_or_default();
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn apply_links(
        conn: &mut PgConnection,
        user_id: i64,
        links: Vec<LinkOp<ApplicationUserRole>>,
    ) -> Result<(), StoreError> {
        for op in links {
            match op {
                LinkOp::Delete(id) => {
                    sqlx::query(
                        "DELETE FROM application_user_roles WHERE id = $1 AND application_user_id = $2",
                    )
                    .bind(id)
                    .bind(user_id)
                    .execute(&mut *conn)
                    .await
                    .map_err(map_sqlx_error)?;
                }
                LinkOp::Insert(membership) => {
                    sqlx::query(
                        r#"
                        INSERT INTO application_user_roles (application_user_id, application_role_id)
                        VALUES ($1, $2)
                        "#,
                    )
                    .bind(user_id)
                    .bind(membership.application_role_id)
                    .execute(&mut *conn)
                    .await
                    .map_err(map_sqlx_error)?;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PgTable for ApplicationRole {
    type Row = ApplicationRoleEntity;

    const SOURCE: &'static str = "application_roles";
    const COLUMNS: &'static str = ROLE_COLUMNS;

    async fn insert(conn: &mut PgConnection, role: &Self) -> Result<Self, StoreError> {
        let sql = format!(
            "INSERT INTO application_roles (name, normalized_name) VALUES ($1, $2) RETURNING {}",
            ROLE_COLUMNS
        );
        let row = sqlx::query_as::<_, ApplicationRoleEntity>(&sql)
            .bind(&role.name)
            .bind(normalize_name(&role.name))
            .fetch_one(conn)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn update(
        conn: &mut PgConnection,
        role: &Self,
        version: Option<i64>,
    ) -> Result<Option<Self>, StoreError> {
        let sql = format!(
            "UPDATE application_roles SET name = $3, normalized_name = $4, version = version + 1 \
             WHERE id = $1 AND version = $2 RETURNING {}",
            ROLE_COLUMNS
        );
        let row = sqlx::query_as::<_, ApplicationRoleEntity>(&sql)
            .bind(role.id)
            .bind(version)
            .bind(&role.name)
            .bind(normalize_name(&role.name))
            .fetch_optional(conn)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(Into::into))
    }
}

#[async_trait]
impl PgTable for Client {
    type Row = ClientEntity;

    const SOURCE: &'static str = "clients";
    const COLUMNS: &'static str = CLIENT_COLUMNS;
    const TRACKED_CHANGES: Option<&'static str> = Some("client_tracked_changes");

    async fn insert(conn: &mut PgConnection, client: &Self) -> Result<Self, StoreError> {
        let sql = format!(
            "INSERT INTO clients (name, abbreviation, deleted, last_modification) \
             VALUES ($1, $2, $3, $4) RETURNING {}",
            CLIENT_COLUMNS
        );
        let row = sqlx::query_as::<_, ClientEntity>(&sql)
            .bind(&client.name)
            .bind(&client.abbreviation)
            .bind(client.deleted)
            .bind(client.last_modification)
            .fetch_one(conn)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn update(
        conn: &mut PgConnection,
        client: &Self,
        version: Option<i64>,
    ) -> Result<Option<Self>, StoreError> {
        let sql = format!(
            "UPDATE clients SET name = $3, abbreviation = $4, deleted = $5, \
             last_modification = $6, version = version + 1 \
             WHERE id = $1 AND version = $2 RETURNING {}",
            CLIENT_COLUMNS
        );
        let row = sqlx::query_as::<_, ClientEntity>(&sql)
            .bind(client.id)
            .bind(version)
            .bind(&client.name)
            .bind(&client.abbreviation)
            .bind(client.deleted)
            .bind(client.last_modification)
            .fetch_optional(conn)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(Into::into))
    }

    async fn attach(pool: &PgPool, clients: &mut [Self], include: &str) -> Result<(), StoreError> {
        let client_ids = ids(clients);
        match include {
            "projects" => {
                let sql = format!(
                    "SELECT {} FROM projects WHERE client_id = ANY($1) AND NOT deleted ORDER BY id",
                    PROJECT_COLUMNS
                );
                let rows = sqlx::query_as::<_, ProjectEntity>(&sql)
                    .bind(&client_ids)
                    .fetch_all(pool)
                    .await
                    .map_err(map_sqlx_error)?;

                let mut grouped: HashMap<i64, Vec<Project>> = HashMap::new();
                for row in rows {
                    grouped.entry(row.client_id).or_default().push(row.into());
                }
                for client in clients.iter_mut() {
                    client.projects = grouped.remove(&client.id).unwrap_or_default();
                }
            }
            "clientStats" => {
                let sql = format!(
                    "SELECT {} FROM client_stats WHERE client_id = ANY($1)",
                    CLIENT_STATS_COLUMNS
                );
                let rows = sqlx::query_as::<_, ClientStatsEntity>(&sql)
                    .bind(&client_ids)
                    .fetch_all(pool)
                    .await
                    .map_err(map_sqlx_error)?;

                let mut stats: HashMap<i64, ClientStats> = rows
                    .into_iter()
                    .map(|row| (row.client_id, row.into()))
                    .collect();
                for client in clients.iter_mut() {
                    client.client_stats = stats.remove(&client.id);
                }
            }
            "trackedChanges" => {
                let mut grouped =
                    tracked_changes_by_entity(pool, "client_tracked_changes", &client_ids).await?;
                for client in clients.iter_mut() {
                    client.tracked_changes = grouped.remove(&client.id).unwrap_or_default();
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[async_trait]
impl PgTable for Project {
    type Row = ProjectEntity;

    const SOURCE: &'static str = "projects";
    const COLUMNS: &'static str = PROJECT_COLUMNS;
    const TRACKED_CHANGES: Option<&'static str> = Some("project_tracked_changes");

    async fn insert(conn: &mut PgConnection, project: &Self) -> Result<Self, StoreError> {
        let sql = format!(
            "INSERT INTO projects (name, client_id, start_date, end_date, state, deleted, \
             last_modification) VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
            PROJECT_COLUMNS
        );
        let row = sqlx::query_as::<_, ProjectEntity>(&sql)
            .bind(&project.name)
            .bind(project.client_id)
            .bind(project.start_date)
            .bind(project.end_date)
            .bind(state_ordinal(project.state))
            .bind(project.deleted)
            .bind(project.last_modification)
            .fetch_one(conn)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn update(
        conn: &mut PgConnection,
        project: &Self,
        version: Option<i64>,
    ) -> Result<Option<Self>, StoreError> {
        let sql = format!(
            "UPDATE projects SET name = $3, client_id = $4, start_date = $5, end_date = $6, \
             state = $7, deleted = $8, last_modification = $9, version = version + 1 \
             WHERE id = $1 AND version = $2 RETURNING {}",
            PROJECT_COLUMNS
        );
        let row = sqlx::query_as::<_, ProjectEntity>(&sql)
            .bind(project.id)
            .bind(version)
            .bind(&project.name)
            .bind(project.client_id)
            .bind(project.start_date)
            .bind(project.end_date)
            .bind(state_ordinal(project.state))
            .bind(project.deleted)
            .bind(project.last_modification)
            .fetch_optional(conn)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(Into::into))
    }

    async fn attach(pool: &PgPool, projects: &mut [Self], include: &str) -> Result<(), StoreError> {
        match include {
            "client" => {
                let client_ids: Vec<i64> = projects.iter().map(|p| p.client_id).collect();
                let sql = format!("SELECT {} FROM clients WHERE id = ANY($1)", CLIENT_COLUMNS);
                let rows = sqlx::query_as::<_, ClientEntity>(&sql)
                    .bind(&client_ids)
                    .fetch_all(pool)
                    .await
                    .map_err(map_sqlx_error)?;

                let clients: HashMap<i64, Client> =
                    rows.into_iter().map(|row| (row.id, row.into())).collect();
                for project in projects.iter_mut() {
                    project.client = clients.get(&project.client_id).cloned().map(Box::new);
                }
            }
            "trackedChanges" => {
                let mut grouped =
                    tracked_changes_by_entity(pool, "project_tracked_changes", &ids(projects))
                        .await?;
                for project in projects.iter_mut() {
                    project.tracked_changes = grouped.remove(&project.id).unwrap_or_default();
                }
            }
            _ => {}
        }
        Ok(())
    }
}

impl PgTable for ClientStats {
    type Row = ClientStatsEntity;

    const SOURCE: &'static str = "client_stats";
    const COLUMNS: &'static str = CLIENT_STATS_COLUMNS;
    const READ_ONLY: bool = true;
}

#[async_trait]
impl PgTable for ContentBlock {
    type Row = ContentBlockEntity;

    const SOURCE: &'static str = "content_blocks";
    const COLUMNS: &'static str = CONTENT_BLOCK_COLUMNS;

    async fn insert(conn: &mut PgConnection, block: &Self) -> Result<Self, StoreError> {
        let sql = format!(
            "INSERT INTO content_blocks (slug, is_page, description, title, value, allowed_tokens) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            CONTENT_BLOCK_COLUMNS
        );
        let row = sqlx::query_as::<_, ContentBlockEntity>(&sql)
            .bind(&block.slug)
            .bind(block.is_page)
            .bind(&block.description)
            .bind(&block.title)
            .bind(&block.value)
            .bind(Json(&block.allowed_tokens))
            .fetch_one(conn)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn update(
        conn: &mut PgConnection,
        block: &Self,
        version: Option<i64>,
    ) -> Result<Option<Self>, StoreError> {
        let sql = format!(
            "UPDATE content_blocks SET slug = $3, is_page = $4, description = $5, title = $6, \
             value = $7, allowed_tokens = $8, version = version + 1 \
             WHERE id = $1 AND version = $2 RETURNING {}",
            CONTENT_BLOCK_COLUMNS
        );
        let row = sqlx::query_as::<_, ContentBlockEntity>(&sql)
            .bind(block.id)
            .bind(version)
            .bind(&block.slug)
            .bind(block.is_page)
            .bind(&block.description)
            .bind(&block.title)
            .bind(&block.value)
            .bind(Json(&block.allowed_tokens))
            .fetch_optional(conn)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(Into::into))
    }
}

#[async_trait]
impl PgTable for Job {
    type Row = JobEntity;

    const SOURCE: &'static str = "jobs";
    const COLUMNS: &'static str = JOB_COLUMNS;

    async fn insert(conn: &mut PgConnection, job: &Self) -> Result<Self, StoreError> {
        let sql = format!(
            "INSERT INTO jobs (name, created, started, updated, ended, expected_count, \
             success_count, failure_count, item_type, item_ids) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING {}",
            JOB_COLUMNS
        );
        let row = sqlx::query_as::<_, JobEntity>(&sql)
            .bind(&job.name)
            .bind(job.created)
            .bind(job.started)
            .bind(job.updated)
            .bind(job.ended)
            .bind(job.expected_count)
            .bind(job.success_count)
            .bind(job.failure_count)
            .bind(&job.item_type)
            .bind(Json(&job.item_ids))
            .fetch_one(conn)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn update(
        conn: &mut PgConnection,
        job: &Self,
        version: Option<i64>,
    ) -> Result<Option<Self>, StoreError> {
        let sql = format!(
            "UPDATE jobs SET name = $3, created = $4, started = $5, updated = $6, ended = $7, \
             expected_count = $8, success_count = $9, failure_count = $10, item_type = $11, \
             item_ids = $12, version = version + 1 \
             WHERE id = $1 AND version = $2 RETURNING {}",
            JOB_COLUMNS
        );
        let row = sqlx::query_as::<_, JobEntity>(&sql)
            .bind(job.id)
            .bind(version)
            .bind(&job.name)
            .bind(job.created)
            .bind(job.started)
            .bind(job.updated)
            .bind(job.ended)
            .bind(job.expected_count)
            .bind(job.success_count)
            .bind(job.failure_count)
            .bind(&job.item_type)
            .bind(Json(&job.item_ids))
            .fetch_optional(conn)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(Into::into))
    }

    async fn attach(pool: &PgPool, jobs: &mut [Self], include: &str) -> Result<(), StoreError> {
        if include != "jobItems" {
            return Ok(());
        }

        let sql = format!(
            "SELECT {} FROM job_items WHERE job_id = ANY($1) ORDER BY id",
            JOB_ITEM_COLUMNS
        );
        let rows = sqlx::query_as::<_, JobItemEntity>(&sql)
            .bind(ids(jobs))
            .fetch_all(pool)
            .await
            .map_err(map_sqlx_error)?;

        let mut grouped: HashMap<i64, Vec<JobItem>> = HashMap::new();
        for row in rows {
            grouped.entry(row.job_id).or_default().push(row.into());
        }
        for job in jobs.iter_mut() {
            job.job_items = grouped.remove(&job.id).unwrap_or_default();
        }
        Ok(())
    }
}

#[async_trait]
impl PgTable for JobItem {
    type Row = JobItemEntity;

    const SOURCE: &'static str = "job_items";
    const COLUMNS: &'static str = JOB_ITEM_COLUMNS;

    async fn insert(conn: &mut PgConnection, item: &Self) -> Result<Self, StoreError> {
        let sql = format!(
            "INSERT INTO job_items (job_id, item_id, timestamp, note) \
             VALUES ($1, $2, $3, $4) RETURNING {}",
            JOB_ITEM_COLUMNS
        );
        let row = sqlx::query_as::<_, JobItemEntity>(&sql)
            .bind(item.job_id)
            .bind(item.item_id)
            .bind(item.timestamp)
            .bind(&item.note)
            .fetch_one(conn)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.into())
    }
}
