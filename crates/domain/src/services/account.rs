//! Sign-in, registration and password management.
//!
//! Failures surface as [`ServiceError::Identity`] with human readable hints
//! the client can show next to the form.

use serde::{Deserialize, Serialize};
use shared::password::{hash_password, verify_password};
use std::sync::Arc;
use tracing::{info, warn};
use validator::ValidateEmail;

use crate::error::ServiceError;
use crate::models::{normalize_name, roles, ApplicationUser, ExternalCredential, NewUser};
use crate::ports::UserDirectory;

use super::access::{resolve_principal, Caller};

const MIN_PASSWORD_LENGTH: usize = 6;

/// Identity of a signed-in user, as handed to the token issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResult {
    pub id: i64,
    pub user_name: String,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    /// Defaults to the e-mail address.
    #[serde(default)]
    pub user_name: Option<String>,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

/// Rules a new password must satisfy. Returns one message per broken rule.
pub fn password_errors(password: &str) -> Vec<String> {
    let mut errors = Vec::new();
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        errors.push(format!(
            "Passwords must be at least {} characters.",
            MIN_PASSWORD_LENGTH
        ));
    }
    if password.chars().all(|c| c.is_ascii_alphanumeric()) {
        errors.push("Passwords must have at least one non alphanumeric character.".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push("Passwords must have at least one digit ('0'-'9').".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        errors.push("Passwords must have at least one lowercase ('a'-'z').".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        errors.push("Passwords must have at least one uppercase ('A'-'Z').".to_string());
    }
    errors
}

pub(super) fn hash(password: &str) -> Result<String, ServiceError> {
    hash_password(password).map_err(|e| ServiceError::Store(e.to_string()))
}

pub(super) async fn login_result(
    users: &dyn UserDirectory,
    user: &ApplicationUser,
) -> Result<LoginResult, ServiceError> {
    Ok(LoginResult {
        id: user.id,
        user_name: user.user_name.clone(),
        roles: users.roles_of(user.id).await?,
    })
}

#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn UserDirectory>,
}

impl AccountService {
    pub fn new(users: Arc<dyn UserDirectory>) -> Self {
        Self { users }
    }

    async fn login_result(&self, user: &ApplicationUser) -> Result<LoginResult, ServiceError> {
        login_result(self.users.as_ref(), user).await
    }

    /// Hints telling a user which external provider they signed up with.
    async fn provider_hints(
        &self,
        user: &ApplicationUser,
        hint: impl Fn(&str) -> String,
    ) -> Result<Vec<String>, ServiceError> {
        Ok(self
            .users
            .external_credentials(user.id)
            .await?
            .iter()
            .map(|c| hint(&c.provider))
            .collect())
    }

    /// Signs in with a user name or e-mail address and a password.
    pub async fn login(&self, user_name: &str, password: &str) -> Result<LoginResult, ServiceError> {
        let key = normalize_name(user_name);
        let user = match self.users.find_by_user_name(&key).await? {
            Some(user) => Some(user),
            None => self.users.find_by_email(&key).await?,
        };

        let Some(user) = user else {
            warn!(user_name = %user_name, "Login failed: unknown user");
            return Err(ServiceError::identity(
                "Invalid username or password",
                Vec::new(),
            ));
        };

        let verified = match user.password_hash.as_deref() {
            Some(stored) => {
                verify_password(password, stored).map_err(|e| ServiceError::Store(e.to_string()))?
            }
            None => false,
        };

        if !verified {
            warn!(user_id = user.id, "Login failed: wrong password");
            let hints = self
                .provider_hints(&user, |provider| {
                    format!(
                        "That email address is used by a {0} account. Try signing in with {0}.",
                        provider
                    )
                })
                .await?;
            return Err(ServiceError::identity("Invalid username or password", hints));
        }

        info!(user_id = user.id, "User logged in");
        self.login_result(&user).await
    }

    /// Signs in through an already verified external identity, creating the
    /// account on first use.
    pub async fn login_external(
        &self,
        provider: &str,
        external_id: &str,
        email: &str,
    ) -> Result<LoginResult, ServiceError> {
        if let Some(credential) = self
            .users
            .find_external_credential(provider, external_id)
            .await?
        {
            let user = self
                .users
                .find_user(credential.application_user_id)
                .await?
                .ok_or_else(|| ServiceError::identity("Invalid user", Vec::new()))?;
            info!(user_id = user.id, provider = %provider, "User logged in externally");
            return self.login_result(&user).await;
        }

        if let Some(existing) = self.users.find_by_email(&normalize_name(email)).await? {
            let mut hints = self
                .provider_hints(&existing, |p| format!("Try logging in with {}.", p))
                .await?;
            if existing.has_password() {
                hints.push("Try logging in with a username and password.".to_string());
            }
            return Err(ServiceError::identity(
                "That email address is already in use.",
                hints,
            ));
        }

        if !email.validate_email() {
            return Err(ServiceError::identity(
                "Unable to create account",
                vec![format!("Email '{}' is invalid.", email)],
            ));
        }

        let user = self
            .users
            .create_user(
                NewUser {
                    user_name: email.to_string(),
                    email: email.to_string(),
                    first_name: String::new(),
                    last_name: String::new(),
                    password_hash: None,
                    email_confirmed: true,
                },
                Some(ExternalCredential {
                    id: 0,
                    application_user_id: 0,
                    provider: provider.to_string(),
                    external_id: external_id.to_string(),
                }),
            )
            .await?;

        info!(user_id = user.id, provider = %provider, "User registered externally");
        self.login_result(&user).await
    }

    /// Creates a password account.
    pub async fn register(&self, registration: Registration) -> Result<LoginResult, ServiceError> {
        let user_name = registration
            .user_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| registration.email.clone());

        let mut errors = Vec::new();
        if !registration.email.validate_email() {
            errors.push(format!("Email '{}' is invalid.", registration.email));
        }
        if self
            .users
            .find_by_user_name(&normalize_name(&user_name))
            .await?
            .is_some()
        {
            errors.push(format!("Username '{}' is already taken.", user_name));
        }
        if self
            .users
            .find_by_email(&normalize_name(&registration.email))
            .await?
            .is_some()
        {
            errors.push(format!("Email '{}' is already taken.", registration.email));
        }
        errors.extend(password_errors(&registration.password));

        if !errors.is_empty() {
            return Err(ServiceError::identity("Unable to create account", errors));
        }

        let user = self
            .users
            .create_user(
                NewUser {
                    user_name,
                    email: registration.email,
                    first_name: registration.first_name,
                    last_name: registration.last_name,
                    password_hash: Some(hash(&registration.password)?),
                    email_confirmed: false,
                },
                None,
            )
            .await?;

        info!(user_id = user.id, "User registered");
        self.login_result(&user).await
    }

    /// Changes the caller's own password.
    pub async fn change_password(
        &self,
        caller: &Caller,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), ServiceError> {
        let principal = resolve_principal(self.users.as_ref(), caller)
            .await?
            .ok_or_else(|| ServiceError::identity("Invalid user", Vec::new()))?;

        let matches = match principal.user.password_hash.as_deref() {
            Some(stored) => verify_password(current_password, stored)
                .map_err(|e| ServiceError::Store(e.to_string()))?,
            None => false,
        };
        if !matches {
            return Err(ServiceError::identity(
                "Unable to change password",
                vec!["Incorrect password.".to_string()],
            ));
        }

        let errors = password_errors(new_password);
        if !errors.is_empty() {
            return Err(ServiceError::identity("Unable to change password", errors));
        }

        self.users
            .set_password_hash(principal.id(), &hash(new_password)?)
            .await?;
        info!(user_id = principal.id(), "Password changed");
        Ok(())
    }

    /// Sets another user's password. Restricted to super admins.
    pub async fn change_user_password(
        &self,
        caller: &Caller,
        user_id: i64,
        new_password: &str,
    ) -> Result<(), ServiceError> {
        let principal = resolve_principal(self.users.as_ref(), caller).await?;
        if !principal
            .as_ref()
            .is_some_and(|p| p.has_role(roles::SUPER_ADMIN))
        {
            return Err(ServiceError::Forbidden);
        }

        if self.users.find_user(user_id).await?.is_none() {
            return Err(ServiceError::NotFound);
        }

        let errors = password_errors(new_password);
        if !errors.is_empty() {
            return Err(ServiceError::identity("Unable to change password", errors));
        }

        self.users
            .set_password_hash(user_id, &hash(new_password)?)
            .await?;
        info!(
            user_id = user_id,
            changed_by = ?principal.map(|p| p.id()),
            "Password reset by administrator"
        );
        Ok(())
    }

    /// Re-reads the caller's identity so a fresh token carries current roles.
    pub async fn refresh(&self, caller: &Caller) -> Result<LoginResult, ServiceError> {
        let principal = resolve_principal(self.users.as_ref(), caller)
            .await?
            .ok_or_else(|| ServiceError::identity("Invalid user", Vec::new()))?;
        Ok(LoginResult {
            id: principal.id(),
            user_name: principal.user.user_name.clone(),
            roles: principal.roles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryDataContext, SEED_PASSWORD};
    use crate::ports::DataContext;

    fn service(ctx: &MemoryDataContext) -> AccountService {
        AccountService::new(ctx.users())
    }

    fn identity_hints(err: ServiceError) -> (String, Vec<String>) {
        match err {
            ServiceError::Identity { message, hints } => (message, hints),
            other => panic!("expected identity error, got {:?}", other),
        }
    }

    #[test]
    fn test_password_rules() {
        assert!(password_errors("Secr3t!").is_empty());
        let errors = password_errors("abc");
        assert_eq!(errors.len(), 4);
        assert!(errors[0].contains("at least 6 characters"));
    }

    #[tokio::test]
    async fn test_login_with_user_name_or_email() {
        let ctx = MemoryDataContext::seeded();
        let service = service(&ctx);

        let by_name = service.login("viewer", SEED_PASSWORD).await.unwrap();
        assert_eq!(by_name.roles, vec![roles::PROJECT_VIEWER.to_string()]);

        let by_email = service
            .login("VIEWER@example.com", SEED_PASSWORD)
            .await
            .unwrap();
        assert_eq!(by_email.id, by_name.id);
    }

    #[tokio::test]
    async fn test_wrong_password_is_rejected() {
        let ctx = MemoryDataContext::seeded();
        let err = service(&ctx).login("viewer", "Wr0ng!!").await.unwrap_err();
        let (message, hints) = identity_hints(err);
        assert_eq!(message, "Invalid username or password");
        assert!(hints.is_empty());
    }

    #[tokio::test]
    async fn test_external_login_creates_then_reuses_account() {
        let ctx = MemoryDataContext::seeded();
        let service = service(&ctx);

        let first = service
            .login_external("Google", "g-123", "ada@example.com")
            .await
            .unwrap();
        let second = service
            .login_external("Google", "g-123", "ada@example.com")
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.user_name, "ada@example.com");
        assert!(first.roles.is_empty());

        let err = service
            .login("ada@example.com", "Whatever1!")
            .await
            .unwrap_err();
        let (_, hints) = identity_hints(err);
        assert_eq!(
            hints,
            vec!["That email address is used by a Google account. Try signing in with Google."]
        );
    }

    #[tokio::test]
    async fn test_external_login_with_taken_email() {
        let ctx = MemoryDataContext::seeded();
        let err = service(&ctx)
            .login_external("Google", "g-999", "viewer@example.com")
            .await
            .unwrap_err();
        let (message, hints) = identity_hints(err);
        assert_eq!(message, "That email address is already in use.");
        assert_eq!(hints, vec!["Try logging in with a username and password."]);
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let ctx = MemoryDataContext::seeded();
        let service = service(&ctx);

        let registered = service
            .register(Registration {
                email: "grace@example.com".to_string(),
                password: "Hopper#1".to_string(),
                first_name: "Grace".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(registered.user_name, "grace@example.com");

        let logged_in = service.login("grace@example.com", "Hopper#1").await.unwrap();
        assert_eq!(logged_in.id, registered.id);
    }

    #[tokio::test]
    async fn test_register_collects_every_problem() {
        let ctx = MemoryDataContext::seeded();
        let err = service(&ctx)
            .register(Registration {
                user_name: Some("viewer".to_string()),
                email: "viewer@example.com".to_string(),
                password: "short".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        let (message, hints) = identity_hints(err);
        assert_eq!(message, "Unable to create account");
        assert!(hints.contains(&"Username 'viewer' is already taken.".to_string()));
        assert!(hints.contains(&"Email 'viewer@example.com' is already taken.".to_string()));
        assert!(hints.iter().any(|h| h.contains("at least 6 characters")));
    }

    #[tokio::test]
    async fn test_change_password() {
        let ctx = MemoryDataContext::seeded();
        let service = service(&ctx);
        let viewer = ctx.seeded_user(roles::PROJECT_VIEWER);

        let err = service
            .change_password(&viewer, "not-it", "N3w-pass")
            .await
            .unwrap_err();
        let (_, hints) = identity_hints(err);
        assert_eq!(hints, vec!["Incorrect password."]);

        service
            .change_password(&viewer, SEED_PASSWORD, "N3w-pass")
            .await
            .unwrap();
        assert!(service.login("viewer", "N3w-pass").await.is_ok());
        assert!(service.login("viewer", SEED_PASSWORD).await.is_err());
    }

    #[tokio::test]
    async fn test_anonymous_cannot_change_password() {
        let ctx = MemoryDataContext::seeded();
        let err = service(&ctx)
            .change_password(&Caller::anonymous(), SEED_PASSWORD, "N3w-pass")
            .await
            .unwrap_err();
        assert_eq!(identity_hints(err).0, "Invalid user");
    }

    #[tokio::test]
    async fn test_only_super_admin_sets_other_passwords() {
        let ctx = MemoryDataContext::seeded();
        let service = service(&ctx);
        let viewer = ctx.seeded_user(roles::PROJECT_VIEWER);
        let viewer_id = viewer.user_id.unwrap();

        let err = service
            .change_user_password(&ctx.seeded_user(roles::PROJECT_MANAGER), viewer_id, "N3w-pass")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden));

        service
            .change_user_password(&ctx.seeded_user(roles::SUPER_ADMIN), viewer_id, "N3w-pass")
            .await
            .unwrap();
        assert!(service.login("viewer", "N3w-pass").await.is_ok());
    }

    #[tokio::test]
    async fn test_refresh_reports_current_roles() {
        let ctx = MemoryDataContext::seeded();
        let manager = ctx.seeded_user(roles::PROJECT_MANAGER);
        let refreshed = service(&ctx).refresh(&manager).await.unwrap();
        assert_eq!(refreshed.id, manager.user_id.unwrap());
        assert_eq!(refreshed.roles, vec![roles::PROJECT_MANAGER.to_string()]);
    }
}
