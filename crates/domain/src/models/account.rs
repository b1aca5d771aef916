//! Identity models: users, roles, role memberships and external credentials.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::concurrency::ConcurrencyToken;
use validator::Validate;

use super::entity::{Entity, EntitySchema, FieldDef, FieldKind, LinkedItem, NoLink};

/// Names of the seeded application roles.
pub mod roles {
    pub const SUPER_ADMIN: &str = "SuperAdmin";
    pub const PROJECT_MANAGER: &str = "ProjectManager";
    pub const PROJECT_VIEWER: &str = "ProjectViewer";
    pub const CONTENT_MANAGER: &str = "ContentManager";

    pub const ALL: &[&str] = &[SUPER_ADMIN, PROJECT_MANAGER, PROJECT_VIEWER, CONTENT_MANAGER];
}

/// Canonical form used for unique user names, e-mails and role names.
pub fn normalize_name(value: &str) -> String {
    value.trim().to_uppercase()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationUser {
    #[serde(default)]
    pub id: i64,

    #[validate(length(min = 1, max = 256, message = "User name must be between 1 and 256 characters"))]
    pub user_name: String,

    #[serde(default, skip_deserializing)]
    pub normalized_user_name: String,

    #[validate(email(message = "Email must be a valid e-mail address"))]
    pub email: String,

    #[serde(default, skip_deserializing)]
    pub normalized_email: String,

    #[serde(default)]
    pub email_confirmed: bool,

    #[validate(length(max = 100, message = "First name cannot exceed 100 characters"))]
    #[serde(default)]
    pub first_name: String,

    #[validate(length(max = 100, message = "Last name cannot exceed 100 characters"))]
    #[serde(default)]
    pub last_name: String,

    /// PHC hash; never serialized.
    #[serde(skip)]
    pub password_hash: Option<String>,

    #[serde(default)]
    pub concurrency_token: Option<ConcurrencyToken>,

    /// Role memberships. When absent from a write, memberships are left as
    /// they are.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<ApplicationUserRole>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub external_credentials: Vec<ExternalCredential>,
}

impl ApplicationUser {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }

    /// Recomputes the normalized lookup columns.
    pub fn normalize(&mut self) {
        self.normalized_user_name = normalize_name(&self.user_name);
        self.normalized_email = normalize_name(&self.email);
    }
}

static USER_FIELDS: &[FieldDef] = &[
    FieldDef::new("id", FieldKind::Int),
    FieldDef::new("userName", FieldKind::Text),
    FieldDef::new("email", FieldKind::Text),
    FieldDef::new("emailConfirmed", FieldKind::Bool),
    FieldDef::new("firstName", FieldKind::Text),
    FieldDef::new("lastName", FieldKind::Text),
];

static USER_SCHEMA: EntitySchema = EntitySchema {
    resource: "applicationUsers",
    entity_name: "ApplicationUser",
    id_field: "id",
    fields: USER_FIELDS,
    includes: &["roles", "externalCredentials"],
    soft_delete: false,
    versioned: true,
};

impl Entity for ApplicationUser {
    type Link = ApplicationUserRole;

    fn schema() -> &'static EntitySchema {
        &USER_SCHEMA
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn display_name(&self) -> String {
        self.user_name.clone()
    }

    fn strip_navigation(&mut self) {
        self.roles = None;
        self.external_credentials.clear();
    }

    fn concurrency_token(&self) -> Option<&ConcurrencyToken> {
        self.concurrency_token.as_ref()
    }

    fn set_concurrency_token(&mut self, token: ConcurrencyToken) {
        self.concurrency_token = Some(token);
    }

    fn take_linked_items(&mut self) -> Option<Vec<ApplicationUserRole>> {
        self.roles.take()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationRole {
    #[serde(default)]
    pub id: i64,

    #[validate(length(min = 1, max = 256, message = "Role name must be between 1 and 256 characters"))]
    pub name: String,

    #[serde(default, skip_deserializing)]
    pub normalized_name: String,

    #[serde(default)]
    pub concurrency_token: Option<ConcurrencyToken>,
}

static ROLE_FIELDS: &[FieldDef] = &[
    FieldDef::new("id", FieldKind::Int),
    FieldDef::new("name", FieldKind::Text),
];

static ROLE_SCHEMA: EntitySchema = EntitySchema {
    resource: "applicationRoles",
    entity_name: "ApplicationRole",
    id_field: "id",
    fields: ROLE_FIELDS,
    includes: &[],
    soft_delete: false,
    versioned: true,
};

impl Entity for ApplicationRole {
    type Link = NoLink;

    fn schema() -> &'static EntitySchema {
        &ROLE_SCHEMA
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }

    fn strip_navigation(&mut self) {}

    fn concurrency_token(&self) -> Option<&ConcurrencyToken> {
        self.concurrency_token.as_ref()
    }

    fn set_concurrency_token(&mut self, token: ConcurrencyToken) {
        self.concurrency_token = Some(token);
    }
}

/// Membership of a user in a role. Carries its own surrogate id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationUserRole {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub application_user_id: i64,
    pub application_role_id: i64,
    /// Role name, filled in when memberships are loaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_name: Option<String>,
}

impl LinkedItem for ApplicationUserRole {
    fn id(&self) -> i64 {
        self.id
    }

    fn set_parent_id(&mut self, parent_id: i64) {
        self.application_user_id = parent_id;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ExternalCredential {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub application_user_id: i64,
    #[validate(length(min = 1, max = 20, message = "Provider must be between 1 and 20 characters"))]
    pub provider: String,
    #[validate(length(min = 1, max = 100, message = "External id must be between 1 and 100 characters"))]
    pub external_id: String,
}

/// An outstanding password reset. Only the digest of the token is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordReset {
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

impl PasswordReset {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Data needed to create an account outside the generic write path.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub user_name: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: Option<String>,
    pub email_confirmed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_sets_lookup_columns() {
        let mut user = ApplicationUser {
            user_name: " jdoe ".to_string(),
            email: "John.Doe@Example.com".to_string(),
            ..Default::default()
        };
        user.normalize();
        assert_eq!(user.normalized_user_name, "JDOE");
        assert_eq!(user.normalized_email, "JOHN.DOE@EXAMPLE.COM");
    }

    #[test]
    fn test_password_hash_is_never_serialized() {
        let user = ApplicationUser {
            user_name: "jdoe".to_string(),
            email: "jdoe@example.com".to_string(),
            password_hash: Some("$argon2id$secret".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("argon2id"));
        assert!(!json.contains("passwordHash"));
    }

    #[test]
    fn test_take_linked_items_empties_roles() {
        let mut user = ApplicationUser {
            roles: Some(vec![ApplicationUserRole {
                application_role_id: 100,
                ..Default::default()
            }]),
            ..Default::default()
        };
        let links = user.take_linked_items();
        assert_eq!(links.map(|l| l.len()), Some(1));
        assert!(user.roles.is_none());
    }

    #[test]
    fn test_invalid_email_fails_validation() {
        let user = ApplicationUser {
            user_name: "jdoe".to_string(),
            email: "not-an-email".to_string(),
            ..Default::default()
        };
        assert!(user.validate().is_err());
    }

    #[test]
    fn test_full_name() {
        let user = ApplicationUser {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            ..Default::default()
        };
        assert_eq!(user.full_name(), "Ada Lovelace");
    }
}
