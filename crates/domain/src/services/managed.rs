//! Wiring of every managed entity: its store, access policy and hooks.

use std::sync::Arc;

use crate::models::{
    roles, ApplicationRole, ApplicationUser, Client, ClientStats, ContentBlock, Entity, Job,
    JobItem, Project,
};
use crate::ports::{DataContext, EntityStore};

use super::access::{AccessPolicy, RolePolicy, RoleRule};
use super::change_tracking::ChangeTracking;
use super::hooks::{
    ApplicationRoleHooks, ApplicationUserHooks, JobHooks, JobItemHooks, ProjectHooks,
};
use super::list::ListService;
use super::read::ReadService;
use super::write::{NoHooks, WriteHooks, WriteService};

const PROJECT_READERS: &[&str] = &[
    roles::SUPER_ADMIN,
    roles::PROJECT_MANAGER,
    roles::PROJECT_VIEWER,
];
const PROJECT_WRITERS: &[&str] = &[roles::SUPER_ADMIN, roles::PROJECT_MANAGER];
const CONTENT_WRITERS: &[&str] = &[roles::SUPER_ADMIN, roles::CONTENT_MANAGER];
const ADMINS: &[&str] = &[roles::SUPER_ADMIN];

/// An entity exposed through the generic services.
pub trait ManagedEntity: Entity {
    fn store(ctx: &dyn DataContext) -> Arc<dyn EntityStore<Self>>;

    fn policy() -> Arc<dyn AccessPolicy<Self>>;

    fn hooks(_ctx: &dyn DataContext) -> Arc<dyn WriteHooks<Self>> {
        Arc::new(NoHooks)
    }

    fn list_service(ctx: &dyn DataContext) -> ListService<Self> {
        ListService::new(Self::store(ctx), Self::policy(), ctx.users())
    }

    fn read_service(ctx: &dyn DataContext) -> ReadService<Self> {
        ReadService::new(Self::list_service(ctx))
    }

    fn write_service(ctx: &dyn DataContext) -> WriteService<Self> {
        WriteService::new(Self::read_service(ctx), Self::hooks(ctx))
    }
}

impl ManagedEntity for Client {
    fn store(ctx: &dyn DataContext) -> Arc<dyn EntityStore<Self>> {
        ctx.clients()
    }

    fn policy() -> Arc<dyn AccessPolicy<Self>> {
        Arc::new(
            RolePolicy::new(
                RoleRule::any_of(PROJECT_READERS),
                RoleRule::any_of(PROJECT_WRITERS),
            )
            .with_include_rule("trackedChanges", RoleRule::any_of(PROJECT_WRITERS)),
        )
    }

    fn hooks(ctx: &dyn DataContext) -> Arc<dyn WriteHooks<Self>> {
        Arc::new(ChangeTracking::new(Arc::new(NoHooks), ctx.clock()))
    }
}

impl ManagedEntity for Project {
    fn store(ctx: &dyn DataContext) -> Arc<dyn EntityStore<Self>> {
        ctx.projects()
    }

    fn policy() -> Arc<dyn AccessPolicy<Self>> {
        Arc::new(
            RolePolicy::new(
                RoleRule::any_of(PROJECT_READERS),
                RoleRule::any_of(PROJECT_WRITERS),
            )
            .with_include_rule("trackedChanges", RoleRule::any_of(PROJECT_WRITERS)),
        )
    }

    fn hooks(ctx: &dyn DataContext) -> Arc<dyn WriteHooks<Self>> {
        Arc::new(ChangeTracking::new(
            Arc::new(ProjectHooks::new(ctx.clients())),
            ctx.clock(),
        ))
    }
}

impl ManagedEntity for ClientStats {
    fn store(ctx: &dyn DataContext) -> Arc<dyn EntityStore<Self>> {
        ctx.client_stats()
    }

    fn policy() -> Arc<dyn AccessPolicy<Self>> {
        Arc::new(RolePolicy::new(
            RoleRule::any_of(PROJECT_READERS),
            RoleRule::nobody(),
        ))
    }
}

impl ManagedEntity for ContentBlock {
    fn store(ctx: &dyn DataContext) -> Arc<dyn EntityStore<Self>> {
        ctx.content_blocks()
    }

    fn policy() -> Arc<dyn AccessPolicy<Self>> {
        Arc::new(
            RolePolicy::new(RoleRule::everyone(), RoleRule::any_of(CONTENT_WRITERS))
                .without_delete(),
        )
    }
}

impl ManagedEntity for Job {
    fn store(ctx: &dyn DataContext) -> Arc<dyn EntityStore<Self>> {
        ctx.jobs()
    }

    fn policy() -> Arc<dyn AccessPolicy<Self>> {
        Arc::new(RolePolicy::new(RoleRule::any_of(ADMINS), RoleRule::any_of(ADMINS)).without_delete())
    }

    fn hooks(ctx: &dyn DataContext) -> Arc<dyn WriteHooks<Self>> {
        Arc::new(JobHooks::new(ctx.clock()))
    }
}

impl ManagedEntity for JobItem {
    fn store(ctx: &dyn DataContext) -> Arc<dyn EntityStore<Self>> {
        ctx.job_items()
    }

    fn policy() -> Arc<dyn AccessPolicy<Self>> {
        Arc::new(
            RolePolicy::new(RoleRule::any_of(ADMINS), RoleRule::any_of(ADMINS))
                .without_update()
                .without_delete(),
        )
    }

    fn hooks(ctx: &dyn DataContext) -> Arc<dyn WriteHooks<Self>> {
        Arc::new(JobItemHooks::new(ctx.clock()))
    }
}

impl ManagedEntity for ApplicationRole {
    fn store(ctx: &dyn DataContext) -> Arc<dyn EntityStore<Self>> {
        ctx.application_roles()
    }

    fn policy() -> Arc<dyn AccessPolicy<Self>> {
        Arc::new(RolePolicy::new(RoleRule::everyone(), RoleRule::any_of(ADMINS)).without_delete())
    }

    fn hooks(_ctx: &dyn DataContext) -> Arc<dyn WriteHooks<Self>> {
        Arc::new(ApplicationRoleHooks)
    }
}

impl ManagedEntity for ApplicationUser {
    fn store(ctx: &dyn DataContext) -> Arc<dyn EntityStore<Self>> {
        ctx.application_users()
    }

    fn policy() -> Arc<dyn AccessPolicy<Self>> {
        Arc::new(RolePolicy::new(RoleRule::any_of(ADMINS), RoleRule::any_of(ADMINS)).without_delete())
    }

    fn hooks(ctx: &dyn DataContext) -> Arc<dyn WriteHooks<Self>> {
        Arc::new(ApplicationUserHooks::new(ctx.users()))
    }
}
