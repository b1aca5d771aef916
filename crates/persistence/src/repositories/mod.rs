//! Repository implementations for database operations.
//!
//! [`PgStore`] implements the generic [`EntityStore`] port once; each table
//! plugs in through [`PgTable`], which supplies its row mapping and the
//! statements that differ between tables.

pub mod tables;
pub mod user_directory;

pub use user_directory::PgUserDirectory;

use async_trait::async_trait;
use shared::concurrency::ConcurrencyToken;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgConnection, PgPool};
use std::marker::PhantomData;

use domain::models::Entity;
use domain::ports::{ChangeKind, ChangeSet, EntityStore, LinkOp};
use domain::query::EntityQuery;
use domain::StoreError;

use crate::error::map_sqlx_error;
use crate::metrics::{record_conflict, QueryTimer};
use crate::sql::{self, bind_values, column_name};

/// Table-specific half of a store.
#[async_trait]
pub trait PgTable: Entity {
    type Row: for<'r> FromRow<'r, PgRow> + Send + Unpin + Into<Self>;

    /// Table or view selected from.
    const SOURCE: &'static str;
    /// Column list of [`Self::Row`].
    const COLUMNS: &'static str;
    /// Audit table receiving tracked changes, if any.
    const TRACKED_CHANGES: Option<&'static str> = None;
    /// Views and other sources that cannot be written.
    const READ_ONLY: bool = false;

    async fn insert(_conn: &mut PgConnection, _entity: &Self) -> Result<Self, StoreError> {
        Err(StoreError::ReadOnly(Self::schema().entity_name))
    }

    /// Updates the row, returning `None` when no row matched the id and
    /// the expected version.
    async fn update(
        _conn: &mut PgConnection,
        _entity: &Self,
        _version: Option<i64>,
    ) -> Result<Option<Self>, StoreError> {
        Err(StoreError::ReadOnly(Self::schema().entity_name))
    }

    /// Loads one include for every item.
    async fn attach(_pool: &PgPool, _items: &mut [Self], _include: &str) -> Result<(), StoreError> {
        Ok(())
    }

    async fn apply_links(
        _conn: &mut PgConnection,
        _parent_id: i64,
        links: Vec<LinkOp<Self::Link>>,
    ) -> Result<(), StoreError> {
        if links.is_empty() {
            Ok(())
        } else {
            Err(StoreError::Database(format!(
                "{} has no linked items",
                Self::schema().entity_name
            )))
        }
    }
}

/// PostgreSQL-backed store for one entity type.
pub struct PgStore<E> {
    pool: PgPool,
    _entity: PhantomData<fn() -> E>,
}

impl<E> PgStore<E> {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _entity: PhantomData,
        }
    }
}

impl<E: PgTable> PgStore<E> {
    fn id_column() -> String {
        column_name(E::schema().id_def())
    }

    async fn exists(conn: &mut PgConnection, id: i64) -> Result<bool, StoreError> {
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE {} = $1)",
            E::SOURCE,
            Self::id_column()
        );
        sqlx::query_scalar::<_, bool>(&sql)
            .bind(id)
            .fetch_one(conn)
            .await
            .map_err(map_sqlx_error)
    }

    async fn commit_in_transaction(&self, changes: ChangeSet<E>) -> Result<E, StoreError> {
        let schema = E::schema();
        let ChangeSet {
            entity,
            kind,
            tracked_change,
            links,
        } = changes;

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let saved = match kind {
            ChangeKind::Insert => E::insert(&mut *tx, &entity).await?,
            ChangeKind::Update => {
                let version = if schema.versioned {
                    let version = entity
                        .concurrency_token()
                        .and_then(ConcurrencyToken::version)
                        .ok_or(StoreError::Conflict)?;
                    Some(version)
                } else {
                    None
                };

                match E::update(&mut *tx, &entity, version).await? {
                    Some(saved) => saved,
                    None => {
                        if schema.versioned && Self::exists(&mut *tx, entity.id()).await? {
                            record_conflict(E::SOURCE);
                            return Err(StoreError::Conflict);
                        }
                        return Err(StoreError::NotFound);
                    }
                }
            }
        };

        if let Some(change) = tracked_change {
            let table = E::TRACKED_CHANGES.ok_or_else(|| {
                StoreError::Database(format!("{} is not tracked", schema.entity_name))
            })?;
            let sql = format!(
                "INSERT INTO {} (entity_id, timestamp, application_user_id, old_value, new_value) \
                 VALUES ($1, $2, $3, $4, $5)",
                table
            );
            sqlx::query(&sql)
                .bind(saved.id())
                .bind(change.timestamp)
                .bind(change.application_user_id)
                .bind(change.old_value)
                .bind(change.new_value)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        }

        E::apply_links(&mut *tx, saved.id(), links).await?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(saved)
    }
}

#[async_trait]
impl<E: PgTable> EntityStore<E> for PgStore<E> {
    async fn fetch(&self, query: &EntityQuery) -> Result<Vec<E>, StoreError> {
        let (sql, values) = sql::select(E::COLUMNS, E::SOURCE, &Self::id_column(), query);

        let timer = QueryTimer::new("fetch", E::SOURCE);
        let result = bind_values!(sqlx::query_as::<_, E::Row>(&sql), &values)
            .fetch_all(&self.pool)
            .await;
        timer.record();

        let mut items: Vec<E> = result
            .map_err(map_sqlx_error)?
            .into_iter()
            .map(Into::into)
            .collect();

        if !items.is_empty() {
            for include in &query.includes {
                E::attach(&self.pool, &mut items, include).await?;
            }
        }
        Ok(items)
    }

    async fn count(&self, query: &EntityQuery, cap: Option<i64>) -> Result<i64, StoreError> {
        let (sql, values) = sql::count(E::SOURCE, query, cap);

        let timer = QueryTimer::new("count", E::SOURCE);
        let result = bind_values!(sqlx::query_scalar::<_, i64>(&sql), &values)
            .fetch_one(&self.pool)
            .await;
        timer.record();

        result.map_err(map_sqlx_error)
    }

    async fn commit(&self, changes: ChangeSet<E>) -> Result<E, StoreError> {
        if E::READ_ONLY {
            return Err(StoreError::ReadOnly(E::schema().entity_name));
        }

        let timer = QueryTimer::new("commit", E::SOURCE);
        let result = self.commit_in_transaction(changes).await;
        timer.record();
        result
    }

    async fn delete(&self, id: i64, soft: bool) -> Result<(), StoreError> {
        let schema = E::schema();
        if E::READ_ONLY {
            return Err(StoreError::ReadOnly(schema.entity_name));
        }

        let sql = if soft && schema.soft_delete {
            format!(
                "UPDATE {} SET deleted = TRUE{} WHERE {} = $1",
                E::SOURCE,
                if schema.versioned { ", version = version + 1" } else { "" },
                Self::id_column()
            )
        } else {
            // Dependent rows go through ON DELETE CASCADE.
            format!("DELETE FROM {} WHERE {} = $1", E::SOURCE, Self::id_column())
        };

        let timer = QueryTimer::new("delete", E::SOURCE);
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await;
        timer.record();

        if result.map_err(map_sqlx_error)?.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::models::{Client, ClientStats, Project};

    #[test]
    fn test_id_column_follows_schema() {
        assert_eq!(PgStore::<Client>::id_column(), "id");
        assert_eq!(PgStore::<ClientStats>::id_column(), "client_id");
    }

    #[test]
    fn test_table_declarations() {
        assert_eq!(<Project as PgTable>::TRACKED_CHANGES, Some("project_tracked_changes"));
        assert!(<ClientStats as PgTable>::READ_ONLY);
        assert!(!<Client as PgTable>::READ_ONLY);
    }
}
