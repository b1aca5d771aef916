//! Single-item retrieval on top of the secured list view.

use crate::error::ServiceError;
use crate::models::Entity;
use crate::query::Predicate;

use super::access::{Caller, Principal};
use super::list::ListService;

pub struct ReadService<E: Entity> {
    list: ListService<E>,
}

impl<E: Entity> Clone for ReadService<E> {
    fn clone(&self) -> Self {
        Self {
            list: self.list.clone(),
        }
    }
}

impl<E: Entity> ReadService<E> {
    pub fn new(list: ListService<E>) -> Self {
        Self { list }
    }

    pub fn list(&self) -> &ListService<E> {
        &self.list
    }

    /// The item with the given id, if the caller can see it.
    pub async fn get_one(
        &self,
        caller: &Caller,
        id: i64,
        includes: Option<&str>,
    ) -> Result<Option<E>, ServiceError> {
        let principal = self.list.principal(caller).await?;
        let includes = self
            .list
            .authorized_includes(principal.as_ref(), includes)?;
        self.find_visible(principal.as_ref(), id, includes).await
    }

    pub(crate) async fn find_visible(
        &self,
        principal: Option<&Principal>,
        id: i64,
        includes: Vec<&'static str>,
    ) -> Result<Option<E>, ServiceError> {
        let Some(mut query) = self.list.secured_query(principal) else {
            return Ok(None);
        };
        query = query.and_where(Predicate::id_eq(E::schema(), id));
        query.includes = includes;
        query.limit = Some(2);

        let mut rows = self.list.store.fetch(&query).await?;
        if rows.len() > 1 {
            return Err(ServiceError::Store(format!(
                "{} {} matched more than one row",
                E::schema().entity_name,
                id
            )));
        }
        Ok(rows.pop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDataContext;
    use crate::models::{roles, Client, Project};
    use crate::ports::DataContext;
    use crate::services::access::{RolePolicy, RoleRule};
    use crate::services::managed::ManagedEntity;
    use std::sync::Arc;

    fn clients(ctx: &MemoryDataContext) -> ReadService<Client> {
        ReadService::new(ListService::new(ctx.clients(), Client::policy(), ctx.users()))
    }

    #[tokio::test]
    async fn test_get_one_with_includes() {
        let ctx = MemoryDataContext::seeded();
        let viewer = ctx.seeded_user(roles::PROJECT_VIEWER);

        let acme = clients(&ctx)
            .get_one(&viewer, 1, Some("projects,clientStats"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(acme.name, "Acme, Inc.");
        assert_eq!(acme.projects.len(), 2);
        assert_eq!(acme.client_stats.map(|s| s.number_of_projects), Some(2));
    }

    #[tokio::test]
    async fn test_missing_and_hidden_items_are_absent() {
        let ctx = MemoryDataContext::seeded();
        let viewer = ctx.seeded_user(roles::PROJECT_VIEWER);
        let service = clients(&ctx);

        assert!(service.get_one(&viewer, 999, None).await.unwrap().is_none());
        assert!(service
            .get_one(&Caller::anonymous(), 1, None)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_empty_read_roles_hide_every_item_from_everyone() {
        let ctx = MemoryDataContext::seeded();
        let service: ReadService<Client> = ReadService::new(ListService::new(
            ctx.clients(),
            Arc::new(RolePolicy::new(RoleRule::nobody(), RoleRule::nobody())),
            ctx.users(),
        ));

        let admin = ctx.seeded_user(roles::SUPER_ADMIN);
        assert!(service.get_one(&admin, 1, None).await.unwrap().is_none());
        assert!(service
            .get_one(&Caller::anonymous(), 1, None)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_include_of_parent() {
        let ctx = MemoryDataContext::seeded();
        let admin = ctx.seeded_user(roles::SUPER_ADMIN);
        let service = ReadService::new(ListService::new(
            ctx.projects(),
            Project::policy(),
            ctx.users(),
        ));

        let project = service
            .get_one(&admin, 2, Some("client"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(project.client.map(|c| c.abbreviation), Some("ACME".to_string()));
    }
}
