//! Secured listing and counting.

use std::sync::Arc;

use crate::error::ServiceError;
use crate::models::Entity;
use crate::ports::{EntityStore, UserDirectory};
use crate::query::{parse_filter, parse_includes, parse_sort, EntityQuery, ListParams};

use super::access::{resolve_principal, AccessPolicy, Caller, Principal, ReadScope};

pub struct ListService<E: Entity> {
    pub(crate) store: Arc<dyn EntityStore<E>>,
    pub(crate) policy: Arc<dyn AccessPolicy<E>>,
    pub(crate) users: Arc<dyn UserDirectory>,
}

impl<E: Entity> Clone for ListService<E> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            policy: Arc::clone(&self.policy),
            users: Arc::clone(&self.users),
        }
    }
}

impl<E: Entity> ListService<E> {
    pub fn new(
        store: Arc<dyn EntityStore<E>>,
        policy: Arc<dyn AccessPolicy<E>>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            store,
            policy,
            users,
        }
    }

    pub async fn principal(&self, caller: &Caller) -> Result<Option<Principal>, ServiceError> {
        resolve_principal(self.users.as_ref(), caller).await
    }

    /// The caller's view of the entity set: live rows narrowed by the read
    /// scope. `None` when the caller may see nothing.
    pub(crate) fn secured_query(&self, principal: Option<&Principal>) -> Option<EntityQuery> {
        let query = EntityQuery::live(E::schema());
        match self.policy.read_scope(principal) {
            ReadScope::All => Some(query),
            ReadScope::Nothing => None,
            ReadScope::Where(predicate) => Some(query.and_where(predicate)),
        }
    }

    /// Resolves and authorizes an include list.
    pub(crate) fn authorized_includes(
        &self,
        principal: Option<&Principal>,
        includes: Option<&str>,
    ) -> Result<Vec<&'static str>, ServiceError> {
        let includes = parse_includes(includes, E::schema())?;
        if let Some(denied) = includes
            .iter()
            .find(|include| !self.policy.can_include(principal, include))
        {
            tracing::debug!(
                entity = E::schema().entity_name,
                include = denied,
                "Include rejected"
            );
            return Err(ServiceError::Forbidden);
        }
        Ok(includes)
    }

    /// A page of the items visible to the caller.
    pub async fn get_all(
        &self,
        caller: &Caller,
        params: &ListParams,
    ) -> Result<Vec<E>, ServiceError> {
        let principal = self.principal(caller).await?;
        let schema = E::schema();

        let includes = self.authorized_includes(principal.as_ref(), params.includes.as_deref())?;
        let filter = parse_filter(params.filter.as_deref(), schema)?;
        let sort = parse_sort(params.order.as_deref(), schema)?;

        let Some(mut query) = self.secured_query(principal.as_ref()) else {
            return Ok(Vec::new());
        };
        if let Some(filter) = filter {
            query = query.and_where(filter);
        }
        query.sort = sort;
        query.includes = includes;
        query.offset = params.offset.max(0);
        query.limit = Some(params.limit.max(0));

        Ok(self.store.fetch(&query).await?)
    }

    /// Number of items visible to the caller, counting at most `max_count`
    /// when it is non-negative.
    pub async fn get_all_count(
        &self,
        caller: &Caller,
        filter: Option<&str>,
        max_count: i64,
    ) -> Result<i64, ServiceError> {
        let principal = self.principal(caller).await?;
        let filter = parse_filter(filter, E::schema())?;

        let Some(mut query) = self.secured_query(principal.as_ref()) else {
            return Ok(0);
        };
        if let Some(filter) = filter {
            query = query.and_where(filter);
        }

        let cap = (max_count >= 0).then_some(max_count);
        Ok(self.store.count(&query, cap).await?)
    }
}
