//! Audit snapshots for change-tracked entities.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::ServiceError;
use crate::models::{ChangeTracked, TrackedChange};
use crate::ports::Clock;

use super::write::{WriteContext, WriteHooks};

/// Wraps an entity's hooks and stages one [`TrackedChange`] per write.
///
/// The snapshot is taken after the inner hooks have run, so it reflects
/// exactly what is committed. The row travels in the change set and is
/// written in the same transaction as the entity, so a failed commit leaves
/// no audit row behind.
pub struct ChangeTracking<E: ChangeTracked> {
    inner: Arc<dyn WriteHooks<E>>,
    clock: Arc<dyn Clock>,
}

impl<E: ChangeTracked> ChangeTracking<E> {
    pub fn new(inner: Arc<dyn WriteHooks<E>>, clock: Arc<dyn Clock>) -> Self {
        Self { inner, clock }
    }
}

fn snapshot<E: ChangeTracked>(entity: &E) -> Result<serde_json::Value, ServiceError> {
    serde_json::to_value(entity)
        .map_err(|e| ServiceError::Store(format!("Failed to snapshot entity: {}", e)))
}

#[async_trait]
impl<E: ChangeTracked> WriteHooks<E> for ChangeTracking<E> {
    async fn on_creating(
        &self,
        ctx: &mut WriteContext<E>,
        entity: &mut E,
    ) -> Result<(), ServiceError> {
        self.inner.on_creating(ctx, entity).await?;

        let now = self.clock.now();
        entity.set_last_modification(now);
        ctx.tracked_change = Some(TrackedChange::staged(
            now,
            ctx.user_id(),
            None,
            snapshot(entity)?,
        ));
        Ok(())
    }

    async fn on_updating(
        &self,
        ctx: &mut WriteContext<E>,
        entity: &mut E,
        old: &E,
    ) -> Result<(), ServiceError> {
        self.inner.on_updating(ctx, entity, old).await?;

        let now = self.clock.now();
        entity.set_last_modification(now);
        ctx.tracked_change = Some(TrackedChange::staged(
            now,
            ctx.user_id(),
            Some(snapshot(old)?),
            snapshot(entity)?,
        ));
        Ok(())
    }

    async fn on_created(&self, ctx: &WriteContext<E>, entity: &E) -> Result<(), ServiceError> {
        self.inner.on_created(ctx, entity).await
    }

    async fn on_updated(
        &self,
        ctx: &WriteContext<E>,
        entity: &E,
        old: &E,
    ) -> Result<(), ServiceError> {
        self.inner.on_updated(ctx, entity, old).await
    }
}
