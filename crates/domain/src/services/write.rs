//! Create, update and delete orchestration.
//!
//! Every write runs the same sequence: strip navigation, authorize, load the
//! baseline (updates only), before-hook, validate, commit, after-hook, log.
//! Nothing is persisted before the commit, so a failure at any earlier step
//! leaves storage untouched. Violations staged by the before-hook are
//! reported together with the entity's own validation rules.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;
use validator::Validate;

use crate::error::{FieldViolation, ServiceError};
use crate::models::{Entity, TrackedChange};
use crate::ports::{ChangeKind, ChangeSet, LinkOp};

use super::access::{Caller, Principal};
use super::linked::{create_linked_items, update_linked_items};
use super::read::ReadService;

/// State shared by the hooks of a single write.
#[derive(Debug)]
pub struct WriteContext<E: Entity> {
    pub principal: Option<Principal>,
    /// Children submitted inline, if any. Hooks decide how to reconcile them.
    pub submitted_links: Option<Vec<E::Link>>,
    pub links: Vec<LinkOp<E::Link>>,
    pub tracked_change: Option<TrackedChange>,
    pub deleted_link_ids: Vec<i64>,
    /// Rules broken in ways only a hook can see, such as dangling references.
    pub violations: Vec<FieldViolation>,
}

impl<E: Entity> WriteContext<E> {
    pub fn new(principal: Option<Principal>, submitted_links: Option<Vec<E::Link>>) -> Self {
        Self {
            principal,
            submitted_links,
            links: Vec::new(),
            tracked_change: None,
            deleted_link_ids: Vec::new(),
            violations: Vec::new(),
        }
    }

    /// Records a violated rule without aborting the write early.
    pub fn reject(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.violations.push(FieldViolation::new(field, message));
    }

    pub fn user_id(&self) -> Option<i64> {
        self.principal.as_ref().map(Principal::id)
    }

    /// Stages inserts for every submitted child.
    pub fn create_linked_items(&mut self, parent_id: i64) {
        if let Some(items) = self.submitted_links.take() {
            self.links.extend(create_linked_items(parent_id, items));
        }
    }

    /// Stages the diff between the submitted and persisted children and
    /// returns the ids staged for deletion. Does nothing when no children
    /// were submitted.
    pub fn update_linked_items(&mut self, parent_id: i64, existing: &[E::Link]) -> Vec<i64> {
        let Some(mut submitted) = self.submitted_links.take() else {
            return Vec::new();
        };
        let diff = update_linked_items(parent_id, &mut submitted, existing);
        self.links.extend(diff.ops);
        self.deleted_link_ids.extend(diff.deleted_ids.iter().copied());
        diff.deleted_ids
    }

    fn change_set(&mut self, entity: E, kind: ChangeKind) -> ChangeSet<E> {
        ChangeSet {
            entity,
            kind,
            tracked_change: self.tracked_change.take(),
            links: std::mem::take(&mut self.links),
        }
    }
}

/// Entity-specific extension points around a write.
///
/// Before-hooks run prior to validation and may adjust the entity or stage
/// extra rows on the context; they must not persist anything themselves.
#[async_trait]
pub trait WriteHooks<E: Entity>: Send + Sync {
    async fn on_creating(
        &self,
        _ctx: &mut WriteContext<E>,
        _entity: &mut E,
    ) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn on_updating(
        &self,
        _ctx: &mut WriteContext<E>,
        _entity: &mut E,
        _old: &E,
    ) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn on_created(&self, _ctx: &WriteContext<E>, _entity: &E) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn on_updated(
        &self,
        _ctx: &WriteContext<E>,
        _entity: &E,
        _old: &E,
    ) -> Result<(), ServiceError> {
        Ok(())
    }
}

/// Fails with every violated rule: those staged on the context and those
/// declared on the entity.
fn validate_with<E: Entity>(
    entity: &E,
    mut violations: Vec<FieldViolation>,
) -> Result<(), ServiceError> {
    if let Err(errors) = entity.validate() {
        if let ServiceError::Validation(declared) = ServiceError::from(errors) {
            violations.extend(declared);
        }
    }

    if violations.is_empty() {
        return Ok(());
    }
    violations.sort_by(|a, b| a.field.cmp(&b.field).then(a.message.cmp(&b.message)));
    Err(ServiceError::Validation(violations))
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl<E: Entity> WriteHooks<E> for NoHooks {}

pub struct WriteService<E: Entity> {
    read: ReadService<E>,
    hooks: Arc<dyn WriteHooks<E>>,
}

impl<E: Entity> WriteService<E> {
    pub fn new(read: ReadService<E>, hooks: Arc<dyn WriteHooks<E>>) -> Self {
        Self { read, hooks }
    }

    pub fn read(&self) -> &ReadService<E> {
        &self.read
    }

    pub async fn create(&self, caller: &Caller, mut entity: E) -> Result<E, ServiceError> {
        let list = self.read.list();
        let principal = list.principal(caller).await?;

        let submitted_links = entity.take_linked_items();
        entity.strip_navigation();
        entity.set_deleted(false);

        if !list.policy.can_create(principal.as_ref(), &entity) {
            return Err(ServiceError::Forbidden);
        }

        let mut ctx = WriteContext::new(principal, submitted_links);
        self.hooks.on_creating(&mut ctx, &mut entity).await?;

        validate_with(&entity, std::mem::take(&mut ctx.violations))?;

        let changes = ctx.change_set(entity, ChangeKind::Insert);
        let saved = list.store.commit(changes).await?;

        self.hooks.on_created(&ctx, &saved).await?;

        info!(
            entity = E::schema().entity_name,
            action = "Created",
            name = %saved.display_name(),
            id = saved.id(),
            user_id = ?ctx.user_id(),
            "Entity created"
        );

        Ok(saved)
    }

    /// Updates the item at `id`; the submitted entity's own id is ignored.
    pub async fn update(&self, caller: &Caller, id: i64, mut entity: E) -> Result<E, ServiceError> {
        let list = self.read.list();
        let principal = list.principal(caller).await?;

        entity.set_id(id);
        let submitted_links = entity.take_linked_items();
        entity.strip_navigation();

        if !list.policy.can_update(principal.as_ref(), &entity) {
            return Err(ServiceError::Forbidden);
        }

        let old = self
            .read
            .find_visible(principal.as_ref(), id, Vec::new())
            .await?
            .ok_or(ServiceError::NotFound)?;
        entity.set_deleted(old.is_deleted());

        let mut ctx = WriteContext::new(principal, submitted_links);
        self.hooks.on_updating(&mut ctx, &mut entity, &old).await?;

        validate_with(&entity, std::mem::take(&mut ctx.violations))?;

        let changes = ctx.change_set(entity, ChangeKind::Update);
        let saved = list.store.commit(changes).await?;

        self.hooks.on_updated(&ctx, &saved, &old).await?;

        info!(
            entity = E::schema().entity_name,
            action = "Updated",
            name = %saved.display_name(),
            id = saved.id(),
            user_id = ?ctx.user_id(),
            "Entity updated"
        );

        Ok(saved)
    }

    /// Soft deletes the item when the entity supports it, otherwise removes
    /// it and its dependent rows.
    pub async fn delete(&self, caller: &Caller, id: i64) -> Result<(), ServiceError> {
        let list = self.read.list();
        let principal = list.principal(caller).await?;

        if !list.policy.can_delete(principal.as_ref(), id) {
            return Err(ServiceError::Forbidden);
        }

        let existing = self
            .read
            .find_visible(principal.as_ref(), id, Vec::new())
            .await?
            .ok_or(ServiceError::NotFound)?;

        let soft = E::schema().soft_delete;
        list.store.delete(id, soft).await?;

        info!(
            entity = E::schema().entity_name,
            action = if soft { "SoftDeleted" } else { "Deleted" },
            name = %existing.display_name(),
            id = id,
            user_id = ?principal.as_ref().map(Principal::id),
            "Entity deleted"
        );

        Ok(())
    }
}
