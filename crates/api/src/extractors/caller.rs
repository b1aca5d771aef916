//! Bearer token authentication.
//!
//! A request without an `Authorization` header is anonymous; the services
//! then decide what an anonymous caller may see. A header that is present
//! but malformed, expired or wrongly signed is rejected with 401.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use domain::services::Caller;
use shared::jwt::JwtConfig;

use crate::app::AppState;
use crate::error::ApiError;

/// The caller identified by the request's bearer token.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedCaller(pub Caller);

fn caller_from_header(jwt: &JwtConfig, header: Option<&str>) -> Result<Caller, ApiError> {
    let Some(header) = header else {
        return Ok(Caller::anonymous());
    };

    let token = header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("Invalid Authorization header format".to_string()))?;

    let claims = jwt
        .validate(token)
        .map_err(|_| ApiError::Unauthorized("Invalid or expired token".to_string()))?;
    let user_id = claims
        .user_id()
        .map_err(|_| ApiError::Unauthorized("Invalid or expired token".to_string()))?;

    Ok(Caller::user(user_id))
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedCaller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = match parts.headers.get(axum::http::header::AUTHORIZATION) {
            Some(value) => Some(value.to_str().map_err(|_| {
                ApiError::Unauthorized("Invalid Authorization header format".to_string())
            })?),
            None => None,
        };

        caller_from_header(&state.jwt, header).map(AuthenticatedCaller)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt() -> JwtConfig {
        JwtConfig::from_secret("test-secret-that-is-at-least-32-bytes-long", 3600, 0).unwrap()
    }

    #[test]
    fn test_missing_header_is_anonymous() {
        let caller = caller_from_header(&jwt(), None).unwrap();
        assert_eq!(caller, Caller::anonymous());
    }

    #[test]
    fn test_valid_token_identifies_user() {
        let jwt = jwt();
        let issued = jwt.issue(42, "jdoe").unwrap();
        let header = format!("Bearer {}", issued.token);
        let caller = caller_from_header(&jwt, Some(&header)).unwrap();
        assert_eq!(caller, Caller::user(42));
    }

    #[test]
    fn test_malformed_header_is_unauthorized() {
        for header in ["Basic abc", "Bearer ", "Bearer not.a.token"] {
            assert!(matches!(
                caller_from_header(&jwt(), Some(header)),
                Err(ApiError::Unauthorized(_))
            ));
        }
    }

    #[test]
    fn test_token_from_other_secret_is_unauthorized() {
        let other =
            JwtConfig::from_secret("another-secret-that-is-at-least-32-bytes", 3600, 0).unwrap();
        let header = format!("Bearer {}", other.issue(1, "admin").unwrap().token);
        assert!(caller_from_header(&jwt(), Some(&header)).is_err());
    }
}
