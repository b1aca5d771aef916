//! Identity lookups backing login, registration and role resolution.

use async_trait::async_trait;
use sqlx::PgPool;

use domain::models::{
    normalize_name, ApplicationUser, ApplicationUserRole, ExternalCredential, NewUser,
    PasswordReset,
};
use domain::ports::UserDirectory;
use domain::StoreError;

use super::tables::memberships_of;
use crate::entities::{ApplicationUserEntity, ExternalCredentialEntity, PasswordResetEntity};
use crate::error::map_sqlx_error;
use crate::metrics::QueryTimer;

const USER_SELECT: &str = r#"
    SELECT id, user_name, normalized_user_name, email, normalized_email, email_confirmed,
           first_name, last_name, password_hash, version
    FROM application_users
"#;

/// Repository for account lookups outside the generic entity path.
#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, filter: &str, value: &str) -> Result<Option<ApplicationUser>, StoreError> {
        let sql = format!("{} WHERE {} = $1", USER_SELECT, filter);
        let timer = QueryTimer::new("find", "application_users");
        let result = sqlx::query_as::<_, ApplicationUserEntity>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await;
        timer.record();

        Ok(result.map_err(map_sqlx_error)?.map(Into::into))
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_user(&self, id: i64) -> Result<Option<ApplicationUser>, StoreError> {
        let sql = format!("{} WHERE id = $1", USER_SELECT);
        let row = sqlx::query_as::<_, ApplicationUserEntity>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(Into::into))
    }

    async fn find_by_user_name(
        &self,
        normalized_user_name: &str,
    ) -> Result<Option<ApplicationUser>, StoreError> {
        self.find_one("normalized_user_name", normalized_user_name)
            .await
    }

    async fn find_by_email(
        &self,
        normalized_email: &str,
    ) -> Result<Option<ApplicationUser>, StoreError> {
        self.find_one("normalized_email", normalized_email).await
    }

    async fn roles_of(&self, user_id: i64) -> Result<Vec<String>, StoreError> {
        let timer = QueryTimer::new("roles", "application_user_roles");
        let result = sqlx::query_scalar::<_, String>(
            r#"
            SELECT r.name
            FROM application_user_roles ur
            JOIN application_roles r ON r.id = ur.application_role_id
            WHERE ur.application_user_id = $1
            ORDER BY r.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await;
        timer.record();

        result.map_err(map_sqlx_error)
    }

    async fn user_roles(&self, user_id: i64) -> Result<Vec<ApplicationUserRole>, StoreError> {
        memberships_of(&self.pool, &[user_id]).await
    }

    async fn find_external_credential(
        &self,
        provider: &str,
        external_id: &str,
    ) -> Result<Option<ExternalCredential>, StoreError> {
        let row = sqlx::query_as::<_, ExternalCredentialEntity>(
            r#"
            SELECT id, application_user_id, provider, external_id
            FROM external_credentials
            WHERE provider = $1 AND external_id = $2
            "#,
        )
        .bind(provider)
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(Into::into))
    }

    async fn external_credentials(
        &self,
        user_id: i64,
    ) -> Result<Vec<ExternalCredential>, StoreError> {
        let rows = sqlx::query_as::<_, ExternalCredentialEntity>(
            r#"
            SELECT id, application_user_id, provider, external_id
            FROM external_credentials
            WHERE application_user_id = $1
            ORDER BY id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn create_user(
        &self,
        user: NewUser,
        credential: Option<ExternalCredential>,
    ) -> Result<ApplicationUser, StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let row = sqlx::query_as::<_, ApplicationUserEntity>(
            r#"
            INSERT INTO application_users (user_name, normalized_user_name, email,
                normalized_email, email_confirmed, first_name, last_name, password_hash)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, user_name, normalized_user_name, email, normalized_email,
                email_confirmed, first_name, last_name, password_hash, version
            "#,
        )
        .bind(&user.user_name)
        .bind(normalize_name(&user.user_name))
        .bind(&user.email)
        .bind(normalize_name(&user.email))
        .bind(user.email_confirmed)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.password_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        if let Some(credential) = credential {
            sqlx::query(
                r#"
                INSERT INTO external_credentials (application_user_id, provider, external_id)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(row.id)
            .bind(&credential.provider)
            .bind(&credential.external_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;

        tracing::info!(user_id = row.id, user_name = %row.user_name, "User created");
        Ok(row.into())
    }

    async fn set_password_hash(
        &self,
        user_id: i64,
        password_hash: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE application_users
            SET password_hash = $2,
                password_reset_token_hash = NULL,
                password_reset_expires_at = NULL,
                version = version + 1
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(password_hash)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn set_password_reset(
        &self,
        user_id: i64,
        reset: &PasswordReset,
    ) -> Result<(), StoreError> {
        let timer = QueryTimer::new("update", "application_users");
        let result = sqlx::query(
            r#"
            UPDATE application_users
            SET password_reset_token_hash = $2, password_reset_expires_at = $3
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(&reset.token_hash)
        .bind(reset.expires_at)
        .execute(&self.pool)
        .await;
        timer.record();

        if result.map_err(map_sqlx_error)?.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn password_reset(&self, user_id: i64) -> Result<Option<PasswordReset>, StoreError> {
        let row = sqlx::query_as::<_, PasswordResetEntity>(
            r#"
            SELECT password_reset_token_hash, password_reset_expires_at
            FROM application_users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.and_then(PasswordResetEntity::into_reset))
    }

    async fn clear_password_reset(&self, user_id: i64) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE application_users
            SET password_reset_token_hash = NULL, password_reset_expires_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }
}
