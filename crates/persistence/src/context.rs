//! PostgreSQL data context.

use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;

use domain::models::{
    ApplicationRole, ApplicationUser, Client, ClientStats, ContentBlock, Job, JobItem, Project,
};
use domain::ports::{Clock, DataContext, EntityStore, SystemClock, UserDirectory};
use domain::StoreError;

use crate::error::map_sqlx_error;
use crate::metrics::record_pool_metrics;
use crate::repositories::{PgStore, PgTable, PgUserDirectory};

/// Hands out stores over one connection pool.
#[derive(Clone)]
pub struct PgDataContext {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PgDataContext {
    pub fn new(pool: PgPool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    pub fn with_clock(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn store<E: PgTable>(&self) -> Arc<dyn EntityStore<E>> {
        Arc::new(PgStore::<E>::new(self.pool.clone()))
    }
}

#[async_trait]
impl DataContext for PgDataContext {
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
        Arc::new(PgUserDirectory::new(self.pool.clone()))
    }

    fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    async fn health(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        record_pool_metrics(&self.pool);
        Ok(())
    }
}
