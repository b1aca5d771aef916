use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use domain::{FieldViolation, ServiceError};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        details: Vec<ValidationDetail>,
    },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("{message}")]
    Identity { message: String, hints: Vec<String> },

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Vec<ValidationDetail>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hints: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationDetail {
    pub field: String,
    pub message: String,
}

impl From<FieldViolation> for ValidationDetail {
    fn from(violation: FieldViolation) -> Self {
        Self {
            field: violation.field,
            message: violation.message,
        }
    }
}

impl ApiError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        ApiError::Validation {
            details: vec![ValidationDetail {
                field: field.into(),
                message: message.clone(),
            }],
            message,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details, hints) = match self {
            ApiError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, "unauthorized", msg, None, None)
            }
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg, None, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg, None, None),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg, None, None),
            ApiError::Duplicate(field) => (
                StatusCode::CONFLICT,
                "duplicate",
                "An item with the same value already exists".to_string(),
                Some(vec![ValidationDetail {
                    field,
                    message: "Value must be unique".to_string(),
                }]),
                None,
            ),
            ApiError::Validation { message, details } => (
                StatusCode::BAD_REQUEST,
                "validation_error",
                message,
                Some(details),
                None,
            ),
            ApiError::InvalidQuery(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_query", msg, None, None)
            }
            ApiError::Identity { message, hints } => (
                StatusCode::BAD_REQUEST,
                "identity_error",
                message,
                None,
                Some(hints),
            ),
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".into(),
                    None,
                    None,
                )
            }
        };

        let body = ErrorBody {
            error: error_code.into(),
            message,
            details,
            hints,
        };

        (status, Json(body)).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Forbidden => {
                ApiError::Forbidden("You are not allowed to perform this action".into())
            }
            ServiceError::NotFound => ApiError::NotFound("Item not found".into()),
            ServiceError::ConcurrencyConflict => ApiError::Conflict(
                "The item was modified by someone else. Reload it and try again.".into(),
            ),
            ServiceError::Validation(violations) => {
                let details: Vec<ValidationDetail> =
                    violations.into_iter().map(Into::into).collect();
                let message = if details.len() == 1 {
                    details[0].message.clone()
                } else {
                    format!("{} validation errors", details.len())
                };
                ApiError::Validation { message, details }
            }
            ServiceError::Identity { message, hints } => ApiError::Identity { message, hints },
            ServiceError::InvalidQuery(msg) => ApiError::InvalidQuery(msg),
            ServiceError::Duplicate(field) => ApiError::Duplicate(field),
            ServiceError::Store(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ServiceError::from(errors).into()
    }
}

impl From<shared::jwt::JwtError> for ApiError {
    fn from(err: shared::jwt::JwtError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_service_error_statuses() {
        let cases = [
            (ServiceError::Forbidden, StatusCode::FORBIDDEN),
            (ServiceError::NotFound, StatusCode::NOT_FOUND),
            (ServiceError::ConcurrencyConflict, StatusCode::CONFLICT),
            (
                ServiceError::InvalidQuery("Unknown field 'password'".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                ServiceError::identity("Invalid username or password", Vec::new()),
                StatusCode::BAD_REQUEST,
            ),
            (
                ServiceError::invalid_field("name", "Name is required"),
                StatusCode::BAD_REQUEST,
            ),
            (ServiceError::Duplicate("slug".into()), StatusCode::CONFLICT),
            (
                ServiceError::Store("connection reset".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), status);
        }
    }

    #[tokio::test]
    async fn test_validation_body_lists_fields() {
        let err = ServiceError::Validation(vec![
            FieldViolation::new("endDate", "End date cannot be before start date"),
            FieldViolation::new("name", "Name must be between 1 and 50 characters"),
        ]);
        let json = body_json(ApiError::from(err).into_response()).await;

        assert_eq!(json["error"], "validation_error");
        assert_eq!(json["message"], "2 validation errors");
        assert_eq!(json["details"][0]["field"], "endDate");
        assert_eq!(json["details"].as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn test_identity_body_carries_hints() {
        let err = ServiceError::identity(
            "That email address is already in use.",
            vec!["Try logging in with Google.".to_string()],
        );
        let json = body_json(ApiError::from(err).into_response()).await;

        assert_eq!(json["error"], "identity_error");
        assert_eq!(json["hints"][0], "Try logging in with Google.");
        assert!(json.get("details").is_none());
    }

    #[tokio::test]
    async fn test_internal_error_hides_cause() {
        let json = body_json(ApiError::Internal("pool timed out".into()).into_response()).await;
        assert_eq!(json["message"], "An internal error occurred");
    }

    #[test]
    fn test_api_error_display() {
        assert_eq!(
            format!("{}", ApiError::Unauthorized("test".to_string())),
            "Unauthorized: test"
        );
        assert_eq!(
            format!("{}", ApiError::validation("name", "Name is required")),
            "Validation error: Name is required"
        );
    }
}
