//! Entity-specific write hooks.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::ServiceError;
use crate::models::{
    normalize_name, ApplicationRole, ApplicationUser, Client, Entity, Job, JobItem, Project,
};
use crate::ports::{Clock, EntityStore, UserDirectory};
use crate::query::{EntityQuery, Predicate};

use super::write::{WriteContext, WriteHooks};

/// Keeps the normalized lookup columns, the password hash and the role
/// memberships of users consistent.
pub struct ApplicationUserHooks {
    users: Arc<dyn UserDirectory>,
}

impl ApplicationUserHooks {
    pub fn new(users: Arc<dyn UserDirectory>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl WriteHooks<ApplicationUser> for ApplicationUserHooks {
    async fn on_creating(
        &self,
        ctx: &mut WriteContext<ApplicationUser>,
        entity: &mut ApplicationUser,
    ) -> Result<(), ServiceError> {
        entity.normalize();
        // Passwords are only ever set through the account service.
        entity.password_hash = None;
        ctx.create_linked_items(entity.id);
        Ok(())
    }

    async fn on_updating(
        &self,
        ctx: &mut WriteContext<ApplicationUser>,
        entity: &mut ApplicationUser,
        old: &ApplicationUser,
    ) -> Result<(), ServiceError> {
        entity.normalize();
        entity.password_hash = old.password_hash.clone();

        if ctx.submitted_links.is_some() {
            let existing = self.users.user_roles(entity.id).await?;
            ctx.update_linked_items(entity.id, &existing);
        }
        Ok(())
    }
}

pub struct ApplicationRoleHooks;

#[async_trait]
impl WriteHooks<ApplicationRole> for ApplicationRoleHooks {
    async fn on_creating(
        &self,
        _ctx: &mut WriteContext<ApplicationRole>,
        entity: &mut ApplicationRole,
    ) -> Result<(), ServiceError> {
        entity.normalized_name = normalize_name(&entity.name);
        Ok(())
    }

    async fn on_updating(
        &self,
        _ctx: &mut WriteContext<ApplicationRole>,
        entity: &mut ApplicationRole,
        _old: &ApplicationRole,
    ) -> Result<(), ServiceError> {
        entity.normalized_name = normalize_name(&entity.name);
        Ok(())
    }
}

/// Rejects projects pointing at a client that does not exist or was deleted.
pub struct ProjectHooks {
    clients: Arc<dyn EntityStore<Client>>,
}

impl ProjectHooks {
    pub fn new(clients: Arc<dyn EntityStore<Client>>) -> Self {
        Self { clients }
    }

    async fn check_client(
        &self,
        ctx: &mut WriteContext<Project>,
        client_id: i64,
    ) -> Result<(), ServiceError> {
        // Non-positive ids are already reported by the entity's own rules.
        if client_id < 1 {
            return Ok(());
        }
        let schema = Client::schema();
        let query = EntityQuery::live(schema).and_where(Predicate::id_eq(schema, client_id));
        if self.clients.count(&query, Some(1)).await? == 0 {
            ctx.reject("clientId", "Client does not exist");
        }
        Ok(())
    }
}

#[async_trait]
impl WriteHooks<Project> for ProjectHooks {
    async fn on_creating(
        &self,
        ctx: &mut WriteContext<Project>,
        entity: &mut Project,
    ) -> Result<(), ServiceError> {
        self.check_client(ctx, entity.client_id).await
    }

    async fn on_updating(
        &self,
        ctx: &mut WriteContext<Project>,
        entity: &mut Project,
        _old: &Project,
    ) -> Result<(), ServiceError> {
        self.check_client(ctx, entity.client_id).await
    }
}

/// Stamps job progress and refuses changes to finished jobs.
pub struct JobHooks {
    clock: Arc<dyn Clock>,
}

impl JobHooks {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

#[async_trait]
impl WriteHooks<Job> for JobHooks {
    async fn on_creating(
        &self,
        _ctx: &mut WriteContext<Job>,
        entity: &mut Job,
    ) -> Result<(), ServiceError> {
        let now = self.clock.now();
        entity.created = Some(now);
        entity.updated = Some(now);
        Ok(())
    }

    async fn on_updating(
        &self,
        ctx: &mut WriteContext<Job>,
        entity: &mut Job,
        old: &Job,
    ) -> Result<(), ServiceError> {
        if old.is_finished() {
            ctx.reject("ended", "A finished job cannot be modified");
        }
        entity.created = old.created;
        entity.updated = Some(self.clock.now());
        Ok(())
    }
}

pub struct JobItemHooks {
    clock: Arc<dyn Clock>,
}

impl JobItemHooks {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

#[async_trait]
impl WriteHooks<JobItem> for JobItemHooks {
    async fn on_creating(
        &self,
        _ctx: &mut WriteContext<JobItem>,
        entity: &mut JobItem,
    ) -> Result<(), ServiceError> {
        if entity.timestamp.is_none() {
            entity.timestamp = Some(self.clock.now());
        }
        Ok(())
    }
}
