//! Identity entities (database row mappings).

use chrono::{DateTime, Utc};
use shared::concurrency::ConcurrencyToken;
use sqlx::FromRow;

use domain::models::{
    ApplicationRole, ApplicationUser, ApplicationUserRole, ExternalCredential, PasswordReset,
};

/// Database row mapping for the application_users table.
#[derive(Debug, Clone, FromRow)]
pub struct ApplicationUserEntity {
    pub id: i64,
    pub user_name: String,
    pub normalized_user_name: String,
    pub email: String,
    pub normalized_email: String,
    pub email_confirmed: bool,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: Option<String>,
    pub version: i64,
}

impl From<ApplicationUserEntity> for ApplicationUser {
    fn from(entity: ApplicationUserEntity) -> Self {
        Self {
            id: entity.id,
            user_name: entity.user_name,
            normalized_user_name: entity.normalized_user_name,
            email: entity.email,
            normalized_email: entity.normalized_email,
            email_confirmed: entity.email_confirmed,
            first_name: entity.first_name,
            last_name: entity.last_name,
            password_hash: entity.password_hash,
            concurrency_token: Some(ConcurrencyToken::from_version(entity.version)),
            roles: None,
            external_credentials: Vec::new(),
        }
    }
}

/// Database row mapping for the application_roles table.
#[derive(Debug, Clone, FromRow)]
pub struct ApplicationRoleEntity {
    pub id: i64,
    pub name: String,
    pub normalized_name: String,
    pub version: i64,
}

impl From<ApplicationRoleEntity> for ApplicationRole {
    fn from(entity: ApplicationRoleEntity) -> Self {
        Self {
            id: entity.id,
            name: entity.name,
            normalized_name: entity.normalized_name,
            concurrency_token: Some(ConcurrencyToken::from_version(entity.version)),
        }
    }
}

/// Role membership joined with the role's name.
#[derive(Debug, Clone, FromRow)]
pub struct ApplicationUserRoleEntity {
    pub id: i64,
    pub application_user_id: i64,
    pub application_role_id: i64,
    pub role_name: String,
}

impl From<ApplicationUserRoleEntity> for ApplicationUserRole {
    fn from(entity: ApplicationUserRoleEntity) -> Self {
        Self {
            id: entity.id,
            application_user_id: entity.application_user_id,
            application_role_id: entity.application_role_id,
            role_name: Some(entity.role_name),
        }
    }
}

/// Database row mapping for the external_credentials table.
#[derive(Debug, Clone, FromRow)]
pub struct ExternalCredentialEntity {
    pub id: i64,
    pub application_user_id: i64,
    pub provider: String,
    pub external_id: String,
}

impl From<ExternalCredentialEntity> for ExternalCredential {
    fn from(entity: ExternalCredentialEntity) -> Self {
        Self {
            id: entity.id,
            application_user_id: entity.application_user_id,
            provider: entity.provider,
            external_id: entity.external_id,
        }
    }
}

/// Reset columns of an application_users row. Both are null when no reset
/// is outstanding.
#[derive(Debug, Clone, FromRow)]
pub struct PasswordResetEntity {
    pub password_reset_token_hash: Option<String>,
    pub password_reset_expires_at: Option<DateTime<Utc>>,
}

impl PasswordResetEntity {
    pub fn into_reset(self) -> Option<PasswordReset> {
        match (self.password_reset_token_hash, self.password_reset_expires_at) {
            (Some(token_hash), Some(expires_at)) => Some(PasswordReset {
                token_hash,
                expires_at,
            }),
            _ => None,
        }
    }
}
