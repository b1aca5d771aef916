//! Access token signing and validation.
//!
//! Tokens are HS256-signed JWTs whose subject is the numeric id of the
//! application user. Roles are deliberately not embedded: they are resolved
//! from the user directory on every request so revocations apply at once.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("Failed to encode token: {0}")]
    EncodingError(String),

    #[error("Failed to decode token: {0}")]
    DecodingError(String),

    #[error("Token has expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

/// JWT claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Application user id.
    pub sub: String,
    /// User name at the time of issue, for log correlation only.
    pub name: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
}

impl Claims {
    /// Parses the subject back into a user id.
    pub fn user_id(&self) -> Result<i64, JwtError> {
        self.sub.parse().map_err(|_| JwtError::InvalidToken)
    }
}

/// An issued access token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub jti: String,
    pub expires_in: i64,
}

/// Signing and validation settings for access tokens.
#[derive(Clone)]
pub struct JwtConfig {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    pub access_token_expiry_secs: i64,
    pub leeway_secs: u64,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("access_token_expiry_secs", &self.access_token_expiry_secs)
            .field("leeway_secs", &self.leeway_secs)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Shortest secret accepted for HS256 signing.
pub const MIN_SECRET_LEN: usize = 32;

impl JwtConfig {
    pub fn from_secret(
        secret: &str,
        access_token_expiry_secs: i64,
        leeway_secs: u64,
    ) -> Result<Self, JwtError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(JwtError::InvalidKey(format!(
                "Signing secret must be at least {} bytes",
                MIN_SECRET_LEN
            )));
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_token_expiry_secs,
            leeway_secs,
        })
    }

    /// Issues an access token for the given user.
    pub fn issue(&self, user_id: i64, user_name: &str) -> Result<IssuedToken, JwtError> {
        let now = Utc::now();
        let jti = Uuid::new_v4().to_string();

        let claims = Claims {
            sub: user_id.to_string(),
            name: user_name.to_string(),
            exp: (now + Duration::seconds(self.access_token_expiry_secs)).timestamp(),
            iat: now.timestamp(),
            jti: jti.clone(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| JwtError::EncodingError(e.to_string()))?;

        Ok(IssuedToken {
            token,
            jti,
            expires_in: self.access_token_expiry_secs,
        })
    }

    /// Validates a token and returns its claims.
    pub fn validate(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = self.leeway_secs;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::TokenExpired,
                jsonwebtoken::errors::ErrorKind::InvalidToken
                | jsonwebtoken::errors::ErrorKind::InvalidSignature => JwtError::InvalidToken,
                _ => JwtError::DecodingError(e.to_string()),
            })
    }
}
