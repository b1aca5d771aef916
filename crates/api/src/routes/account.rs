//! Account endpoint handlers: sign-in, registration and passwords.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use domain::models::ContentBlock;
use domain::services::{
    AccountService, ContentService, LoginResult, ManagedEntity, PasswordResetService, Registration,
};

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::AuthenticatedCaller;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub user_name: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalLoginRequest {
    pub provider: String,
    pub external_id: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetPasswordRequest {
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPasswordResetRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub email: String,
    pub token: String,
    pub new_password: String,
}

/// Access token handed out after a successful sign-in.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: LoginResult,
}

fn account_service(state: &AppState) -> AccountService {
    AccountService::new(state.ctx.users())
}

fn password_reset_service(state: &AppState) -> PasswordResetService {
    PasswordResetService::new(
        state.ctx.users(),
        ContentService::new(ContentBlock::list_service(state.ctx.as_ref())),
        state.mailer.clone(),
        state.ctx.clock(),
        state.password_reset.clone(),
    )
}

fn body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ApiError::validation("body", rejection.body_text()))
}

fn issue_token(state: &AppState, user: LoginResult) -> Result<Json<TokenResponse>, ApiError> {
    let issued = state.jwt.issue(user.id, &user.user_name)?;
    tracing::debug!(user_id = user.id, jti = %issued.jti, "Access token issued");
    Ok(Json(TokenResponse {
        access_token: issued.token,
        token_type: "Bearer",
        expires_in: issued.expires_in,
        user,
    }))
}

/// Sign in with user name (or e-mail) and password.
///
/// POST /api/account/login
pub async fn login(
    State(state): State<AppState>,
    request: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, ApiError> {
    let request = body(request)?;
    let user = account_service(&state)
        .login(&request.user_name, &request.password)
        .await?;

    issue_token(&state, user)
}

/// Sign in with a credential asserted by an external identity provider.
///
/// POST /api/account/loginExternalCredential
pub async fn login_external_credential(
    State(state): State<AppState>,
    request: Result<Json<ExternalLoginRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, ApiError> {
    let request = body(request)?;
    let user = account_service(&state)
        .login_external(
            &request.provider,
            &request.external_id,
            &request.email,
        )
        .await?;

    issue_token(&state, user)
}

/// Register a new account and sign it in.
///
/// POST /api/account/register
pub async fn register(
    State(state): State<AppState>,
    request: Result<Json<Registration>, JsonRejection>,
) -> Result<(StatusCode, Json<TokenResponse>), ApiError> {
    let registration = body(request)?;
    let user = account_service(&state).register(registration).await?;
    Ok((StatusCode::CREATED, issue_token(&state, user)?))
}

/// Issue a fresh token carrying the caller's current roles.
///
/// POST /api/account/refresh
pub async fn refresh(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
) -> Result<Json<TokenResponse>, ApiError> {
    if caller.user_id.is_none() {
        return Err(ApiError::Unauthorized("Authentication required".into()));
    }
    let user = account_service(&state).refresh(&caller).await?;
    issue_token(&state, user)
}

/// Change the caller's own password.
///
/// POST /api/account/changePassword
pub async fn change_password(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    request: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    if caller.user_id.is_none() {
        return Err(ApiError::Unauthorized("Authentication required".into()));
    }
    let request = body(request)?;
    account_service(&state)
        .change_password(&caller, &request.current_password, &request.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Set another user's password.
///
/// PUT /api/account/users/:id/password
pub async fn set_user_password(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Path(user_id): Path<i64>,
    request: Result<Json<SetPasswordRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let request = body(request)?;
    account_service(&state)
        .change_user_password(&caller, user_id, &request.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// E-mail a password reset link. Succeeds whether or not the address
/// belongs to an account.
///
/// POST /api/account/requestPasswordReset
pub async fn request_password_reset(
    State(state): State<AppState>,
    request: Result<Json<RequestPasswordResetRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let request = body(request)?;
    password_reset_service(&state)
        .request_password_reset(&request.email)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Choose a new password with an e-mailed reset token and sign in.
///
/// POST /api/account/resetPassword
pub async fn reset_password(
    State(state): State<AppState>,
    request: Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, ApiError> {
    let request = body(request)?;
    let user = password_reset_service(&state)
        .reset_password(&request.email, &request.token, &request.new_password)
        .await?;

    issue_token(&state, user)
}
