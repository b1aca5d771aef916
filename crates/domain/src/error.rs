//! Error types shared by the domain services and persistence ports.

use serde::Serialize;
use thiserror::Error;

/// A single violated validation rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors surfaced by the domain services.
///
/// Every failure reaching the transport boundary is one of these; raw
/// persistence errors are folded into [`ServiceError::Store`].
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Forbidden")]
    Forbidden,

    #[error("Validation failed")]
    Validation(Vec<FieldViolation>),

    #[error("Not found")]
    NotFound,

    #[error("The item was modified by someone else")]
    ConcurrencyConflict,

    #[error("{message}")]
    Identity { message: String, hints: Vec<String> },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Store error: {0}")]
    Store(String),
}

impl ServiceError {
    pub fn identity(message: impl Into<String>, hints: Vec<String>) -> Self {
        ServiceError::Identity {
            message: message.into(),
            hints,
        }
    }

    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        ServiceError::Validation(vec![FieldViolation::new(field, message)])
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut violations: Vec<FieldViolation> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                let field = if field.to_string() == "__all__" {
                    String::new()
                } else {
                    camel_case(field)
                };
                errors.iter().map(move |e| FieldViolation {
                    field: field.clone(),
                    message: e
                        .message
                        .clone()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string()),
                })
            })
            .collect();

        violations.sort_by(|a, b| a.field.cmp(&b.field).then(a.message.cmp(&b.message)));
        ServiceError::Validation(violations)
    }
}

/// `start_date` -> `startDate`, matching the wire names.
fn camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Errors raised by persistence ports.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The stored concurrency token no longer matches the submitted one.
    #[error("Concurrency conflict")]
    Conflict,

    #[error("Row not found")]
    NotFound,

    #[error("Unique constraint violated: {0}")]
    Duplicate(String),

    #[error("Referenced row does not exist: {0}")]
    InvalidReference(String),

    #[error("{0} is read-only")]
    ReadOnly(&'static str),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => ServiceError::ConcurrencyConflict,
            StoreError::NotFound => ServiceError::NotFound,
            StoreError::Duplicate(what) => ServiceError::Duplicate(what),
            StoreError::InvalidReference(field) => {
                ServiceError::invalid_field(field, "Referenced item does not exist")
            }
            StoreError::ReadOnly(_) => ServiceError::Forbidden,
            StoreError::Database(msg) => ServiceError::Store(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Sample {
        #[validate(length(min = 1, max = 5, message = "Name must be 1-5 characters"))]
        name: String,
        #[validate(range(min = 0, message = "Count cannot be negative"))]
        count: i32,
    }

    #[test]
    fn test_validation_errors_collects_every_field() {
        let sample = Sample {
            name: "too long".to_string(),
            count: -1,
        };
        let err: ServiceError = sample.validate().unwrap_err().into();

        match err {
            ServiceError::Validation(violations) => {
                assert_eq!(violations.len(), 2);
                assert_eq!(violations[0].field, "count");
                assert_eq!(violations[1].field, "name");
                assert_eq!(violations[1].message, "Name must be 1-5 characters");
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_field_names_are_camel_cased() {
        assert_eq!(camel_case("client_id"), "clientId");
        assert_eq!(camel_case("name"), "name");
    }

    #[test]
    fn test_store_conflict_maps_to_concurrency_conflict() {
        let err: ServiceError = StoreError::Conflict.into();
        assert!(matches!(err, ServiceError::ConcurrencyConflict));
    }

    #[test]
    fn test_invalid_reference_maps_to_field_violation() {
        let err: ServiceError = StoreError::InvalidReference("clientId".into()).into();
        match err {
            ServiceError::Validation(v) => assert_eq!(v[0].field, "clientId"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_identity_error_display_is_message() {
        let err = ServiceError::identity("Invalid username or password", vec![]);
        assert_eq!(err.to_string(), "Invalid username or password");
    }
}
