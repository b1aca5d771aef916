//! Password reset through an e-mailed one-time token.

use chrono::Duration;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use shared::crypto::{generate_secure_token, sha256_hex};

use crate::error::ServiceError;
use crate::models::{normalize_name, ApplicationUser, PasswordReset};
use crate::ports::{Clock, MailMessage, Mailer, UserDirectory};

use super::access::Caller;
use super::account::{hash, login_result, password_errors, LoginResult};
use super::content::ContentService;

/// Content block rendered into the reset e-mail.
pub const RESET_EMAIL_SLUG: &str = "password-reset-email";

/// Token substituted with the reset link.
const RESET_URL_TOKEN: &str = "passwordResetUrl";

#[derive(Debug, Clone)]
pub struct PasswordResetSettings {
    /// Page the e-mailed link opens. The token is appended as a query
    /// parameter.
    pub reset_url: String,
    pub token_ttl: Duration,
}

impl Default for PasswordResetSettings {
    fn default() -> Self {
        Self {
            reset_url: "http://localhost:8080/#/login".to_string(),
            token_ttl: Duration::hours(1),
        }
    }
}

fn invalid_token() -> ServiceError {
    ServiceError::identity("Unable to reset password", vec!["Invalid token.".to_string()])
}

#[derive(Clone)]
pub struct PasswordResetService {
    users: Arc<dyn UserDirectory>,
    content: ContentService,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    settings: PasswordResetSettings,
}

impl PasswordResetService {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        content: ContentService,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
        settings: PasswordResetSettings,
    ) -> Self {
        Self {
            users,
            content,
            mailer,
            clock,
            settings,
        }
    }

    fn reset_link(&self, token: &str) -> String {
        let separator = if self.settings.reset_url.contains('?') {
            '&'
        } else {
            '?'
        };
        format!("{}{}token={}", self.settings.reset_url, separator, token)
    }

    async fn render_email(
        &self,
        user: &ApplicationUser,
        token: &str,
    ) -> Result<MailMessage, ServiceError> {
        let tokens = HashMap::from([(RESET_URL_TOKEN.to_string(), self.reset_link(token))]);
        let content = self
            .content
            .content_data(&Caller::anonymous(), RESET_EMAIL_SLUG, &tokens)
            .await
            .map_err(|err| match err {
                ServiceError::NotFound => {
                    ServiceError::Store(format!("Content block '{}' is missing", RESET_EMAIL_SLUG))
                }
                other => other,
            })?;

        let full_name = user.full_name();
        Ok(MailMessage {
            to_name: if full_name.is_empty() {
                user.user_name.clone()
            } else {
                full_name
            },
            to_email: user.email.clone(),
            subject: content.title,
            body: content.content,
        })
    }

    /// Mails a reset link to the account with this address. Unknown
    /// addresses succeed without sending anything, so the response never
    /// reveals whether an account exists.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), ServiceError> {
        let Some(user) = self.users.find_by_email(&normalize_name(email)).await? else {
            debug!(email = %email, "Password reset requested for unknown email");
            return Ok(());
        };

        let token = generate_secure_token();
        let message = self.render_email(&user, &token).await?;
        let reset = PasswordReset {
            token_hash: sha256_hex(&token),
            expires_at: self.clock.now() + self.settings.token_ttl,
        };

        self.users.set_password_reset(user.id, &reset).await?;
        self.mailer.send(message).await?;

        // Never log the token itself.
        info!(user_id = user.id, "Password reset token generated");
        Ok(())
    }

    /// Sets a new password when `token` matches the outstanding reset of the
    /// account with this address. The token is single use.
    pub async fn reset_password(
        &self,
        email: &str,
        token: &str,
        new_password: &str,
    ) -> Result<LoginResult, ServiceError> {
        let user = self
            .users
            .find_by_email(&normalize_name(email))
            .await?
            .ok_or_else(invalid_token)?;

        let Some(reset) = self.users.password_reset(user.id).await? else {
            warn!(user_id = user.id, "Password reset failed: no reset requested");
            return Err(invalid_token());
        };
        if reset.token_hash != sha256_hex(token) {
            warn!(user_id = user.id, "Password reset failed: token mismatch");
            return Err(invalid_token());
        }

        if reset.is_expired(self.clock.now()) {
            self.users.clear_password_reset(user.id).await?;
            warn!(user_id = user.id, "Password reset failed: token expired");
            return Err(ServiceError::identity(
                "Unable to reset password",
                vec![
                    "The reset link has expired.".to_string(),
                    "Request a new password reset.".to_string(),
                ],
            ));
        }

        let errors = password_errors(new_password);
        if !errors.is_empty() {
            return Err(ServiceError::identity("Unable to reset password", errors));
        }

        self.users
            .set_password_hash(user.id, &hash(new_password)?)
            .await?;
        info!(user_id = user.id, "Password reset");

        login_result(self.users.as_ref(), &user).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryDataContext, RecordingMailer, SEED_PASSWORD};
    use crate::models::{roles, ContentBlock};
    use crate::ports::DataContext;
    use crate::services::account::AccountService;
    use crate::services::managed::ManagedEntity;

    fn service(ctx: &MemoryDataContext, mailer: Arc<RecordingMailer>) -> PasswordResetService {
        PasswordResetService::new(
            ctx.users(),
            ContentService::new(ContentBlock::list_service(ctx)),
            mailer,
            ctx.clock(),
            PasswordResetSettings {
                reset_url: "https://app.example.com/#/login".to_string(),
                token_ttl: Duration::minutes(30),
            },
        )
    }

    fn mailed_token(mailer: &RecordingMailer) -> String {
        let sent = mailer.sent();
        let body = &sent.last().expect("no mail sent").body;
        body.rsplit("token=").next().unwrap_or_default().to_string()
    }

    fn identity_hints(err: ServiceError) -> (String, Vec<String>) {
        match err {
            ServiceError::Identity { message, hints } => (message, hints),
            other => panic!("expected identity error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_request_mails_rendered_link() {
        let ctx = MemoryDataContext::seeded();
        let mailer = Arc::new(RecordingMailer::new());

        service(&ctx, mailer.clone())
            .request_password_reset("Viewer@Example.com")
            .await
            .unwrap();

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to_email, "viewer@example.com");
        assert_eq!(sent[0].to_name, "viewer");
        assert_eq!(sent[0].subject, "Reset your password");
        assert!(sent[0]
            .body
            .contains("https://app.example.com/#/login?token="));
        assert_eq!(mailed_token(&mailer).len(), 64);
    }

    #[tokio::test]
    async fn test_unknown_email_sends_nothing() {
        let ctx = MemoryDataContext::seeded();
        let mailer = Arc::new(RecordingMailer::new());

        service(&ctx, mailer.clone())
            .request_password_reset("nobody@example.com")
            .await
            .unwrap();
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_only_the_digest_is_stored() {
        let ctx = MemoryDataContext::seeded();
        let mailer = Arc::new(RecordingMailer::new());
        service(&ctx, mailer.clone())
            .request_password_reset("viewer@example.com")
            .await
            .unwrap();

        let viewer = ctx.seeded_user(roles::PROJECT_VIEWER).user_id.unwrap();
        let stored = ctx.users().password_reset(viewer).await.unwrap().unwrap();
        let token = mailed_token(&mailer);
        assert_ne!(stored.token_hash, token);
        assert_eq!(stored.token_hash, sha256_hex(&token));
        assert_eq!(stored.expires_at, ctx.clock().now() + Duration::minutes(30));
    }

    #[tokio::test]
    async fn test_valid_token_resets_password_once() {
        let ctx = MemoryDataContext::seeded();
        let mailer = Arc::new(RecordingMailer::new());
        let service = service(&ctx, mailer.clone());

        service
            .request_password_reset("viewer@example.com")
            .await
            .unwrap();
        let token = mailed_token(&mailer);

        let user = service
            .reset_password("viewer@example.com", &token, "Fr3sh-start")
            .await
            .unwrap();
        assert_eq!(user.user_name, "viewer");
        assert_eq!(user.roles, vec![roles::PROJECT_VIEWER.to_string()]);

        let accounts = AccountService::new(ctx.users());
        assert!(accounts.login("viewer", "Fr3sh-start").await.is_ok());
        assert!(accounts.login("viewer", SEED_PASSWORD).await.is_err());

        let err = service
            .reset_password("viewer@example.com", &token, "Again-2nd")
            .await
            .unwrap_err();
        let (message, hints) = identity_hints(err);
        assert_eq!(message, "Unable to reset password");
        assert_eq!(hints, vec!["Invalid token."]);
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected_and_discarded() {
        let ctx = MemoryDataContext::seeded();
        let mailer = Arc::new(RecordingMailer::new());
        let service = service(&ctx, mailer.clone());

        service
            .request_password_reset("viewer@example.com")
            .await
            .unwrap();
        let token = mailed_token(&mailer);
        ctx.fixed_clock()
            .set(ctx.clock().now() + Duration::minutes(31));

        let err = service
            .reset_password("viewer@example.com", &token, "Fr3sh-start")
            .await
            .unwrap_err();
        let (message, hints) = identity_hints(err);
        assert_eq!(message, "Unable to reset password");
        assert_eq!(
            hints,
            vec!["The reset link has expired.", "Request a new password reset."]
        );

        let viewer = ctx.seeded_user(roles::PROJECT_VIEWER).user_id.unwrap();
        assert!(ctx.users().password_reset(viewer).await.unwrap().is_none());
        assert!(AccountService::new(ctx.users())
            .login("viewer", SEED_PASSWORD)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_unknown_token_is_rejected() {
        let ctx = MemoryDataContext::seeded();
        let mailer = Arc::new(RecordingMailer::new());
        let service = service(&ctx, mailer.clone());

        let err = service
            .reset_password("viewer@example.com", "not-a-token", "Fr3sh-start")
            .await
            .unwrap_err();
        assert_eq!(identity_hints(err).1, vec!["Invalid token."]);

        service
            .request_password_reset("viewer@example.com")
            .await
            .unwrap();
        let err = service
            .reset_password("viewer@example.com", &"0".repeat(64), "Fr3sh-start")
            .await
            .unwrap_err();
        assert_eq!(identity_hints(err).1, vec!["Invalid token."]);

        let token = mailed_token(&mailer);
        let err = service
            .reset_password("manager@example.com", &token, "Fr3sh-start")
            .await
            .unwrap_err();
        assert_eq!(identity_hints(err).1, vec!["Invalid token."]);
    }

    #[tokio::test]
    async fn test_weak_password_keeps_token_usable() {
        let ctx = MemoryDataContext::seeded();
        let mailer = Arc::new(RecordingMailer::new());
        let service = service(&ctx, mailer.clone());

        service
            .request_password_reset("viewer@example.com")
            .await
            .unwrap();
        let token = mailed_token(&mailer);

        let err = service
            .reset_password("viewer@example.com", &token, "weak")
            .await
            .unwrap_err();
        let (_, hints) = identity_hints(err);
        assert!(hints.iter().any(|h| h.contains("at least 6 characters")));

        assert!(service
            .reset_password("viewer@example.com", &token, "Fr3sh-start")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_changing_password_discards_outstanding_reset() {
        let ctx = MemoryDataContext::seeded();
        let mailer = Arc::new(RecordingMailer::new());
        let service = service(&ctx, mailer.clone());

        service
            .request_password_reset("viewer@example.com")
            .await
            .unwrap();
        let token = mailed_token(&mailer);

        let viewer = ctx.seeded_user(roles::PROJECT_VIEWER);
        AccountService::new(ctx.users())
            .change_password(&viewer, SEED_PASSWORD, "N3w-pass")
            .await
            .unwrap();

        let err = service
            .reset_password("viewer@example.com", &token, "Fr3sh-start")
            .await
            .unwrap_err();
        assert_eq!(identity_hints(err).1, vec!["Invalid token."]);
    }
}
