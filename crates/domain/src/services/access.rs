//! Caller resolution and role-based access policies.
//!
//! Read access never fails: a caller outside the read roles sees an empty
//! dataset, so existence is not leaked. Write access is checked before
//! anything is loaded and fails with [`ServiceError::Forbidden`].

use crate::error::ServiceError;
use crate::models::{ApplicationUser, Entity};
use crate::ports::UserDirectory;
use crate::query::Predicate;

/// Identity of the party making a request, as asserted by the transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Option<i64>,
}

impl Caller {
    pub fn anonymous() -> Self {
        Self { user_id: None }
    }

    pub fn user(user_id: i64) -> Self {
        Self {
            user_id: Some(user_id),
        }
    }
}

/// A caller resolved to an application user and their roles.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user: ApplicationUser,
    pub roles: Vec<String>,
}

impl Principal {
    pub fn id(&self) -> i64 {
        self.user.id
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Resolves a caller to a principal. Unknown users are treated as anonymous.
pub async fn resolve_principal(
    users: &dyn UserDirectory,
    caller: &Caller,
) -> Result<Option<Principal>, ServiceError> {
    let Some(user_id) = caller.user_id else {
        return Ok(None);
    };

    let Some(user) = users.find_user(user_id).await? else {
        return Ok(None);
    };

    let roles = users.roles_of(user.id).await?;
    Ok(Some(Principal { user, roles }))
}

/// Allow-list of roles.
///
/// `None` lets everyone through, anonymous callers included. An empty list
/// lets no one through. Otherwise the caller must hold one of the roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleRule(Option<&'static [&'static str]>);

impl RoleRule {
    pub const fn everyone() -> Self {
        Self(None)
    }

    pub const fn nobody() -> Self {
        Self(Some(&[]))
    }

    pub const fn any_of(roles: &'static [&'static str]) -> Self {
        Self(Some(roles))
    }

    pub fn permits(&self, principal: Option<&Principal>) -> bool {
        match (self.0, principal) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(roles), Some(principal)) => roles.iter().any(|r| principal.has_role(r)),
        }
    }
}

/// Rows a caller may see.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadScope {
    All,
    Nothing,
    Where(Predicate),
}

/// Per-entity security strategy consulted by the generic services.
pub trait AccessPolicy<E: Entity>: Send + Sync {
    fn read_roles(&self) -> RoleRule;

    fn write_roles(&self) -> RoleRule;

    fn read_scope(&self, principal: Option<&Principal>) -> ReadScope {
        if self.read_roles().permits(principal) {
            ReadScope::All
        } else {
            ReadScope::Nothing
        }
    }

    fn can_write(&self, principal: Option<&Principal>, _entity: &E) -> bool {
        self.write_roles().permits(principal)
    }

    fn can_create(&self, principal: Option<&Principal>, entity: &E) -> bool {
        self.can_write(principal, entity)
    }

    fn can_update(&self, principal: Option<&Principal>, entity: &E) -> bool {
        self.can_write(principal, entity)
    }

    fn can_delete(&self, principal: Option<&Principal>, _id: i64) -> bool {
        self.write_roles().permits(principal)
    }

    /// Checked for every requested include; a refusal fails the request.
    fn can_include(&self, _principal: Option<&Principal>, _include: &str) -> bool {
        true
    }
}

/// The stock role-driven policy, with per-operation switches.
#[derive(Debug, Clone)]
pub struct RolePolicy {
    read: RoleRule,
    write: RoleRule,
    include_rules: Vec<(&'static str, RoleRule)>,
    allow_update: bool,
    allow_delete: bool,
}

impl RolePolicy {
    pub fn new(read: RoleRule, write: RoleRule) -> Self {
        Self {
            read,
            write,
            include_rules: Vec::new(),
            allow_update: true,
            allow_delete: true,
        }
    }

    /// Restricts an include to the given roles.
    pub fn with_include_rule(mut self, include: &'static str, rule: RoleRule) -> Self {
        self.include_rules.push((include, rule));
        self
    }

    pub fn without_update(mut self) -> Self {
        self.allow_update = false;
        self
    }

    pub fn without_delete(mut self) -> Self {
        self.allow_delete = false;
        self
    }
}

impl<E: Entity> AccessPolicy<E> for RolePolicy {
    fn read_roles(&self) -> RoleRule {
        self.read
    }

    fn write_roles(&self) -> RoleRule {
        self.write
    }

    fn can_update(&self, principal: Option<&Principal>, entity: &E) -> bool {
        self.allow_update && self.can_write(principal, entity)
    }

    fn can_delete(&self, principal: Option<&Principal>, _id: i64) -> bool {
        self.allow_delete && self.write.permits(principal)
    }

    fn can_include(&self, principal: Option<&Principal>, include: &str) -> bool {
        self.include_rules
            .iter()
            .filter(|(name, _)| *name == include)
            .all(|(_, rule)| rule.permits(principal))
    }
}
