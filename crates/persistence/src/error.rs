//! Translation of database errors into [`StoreError`]s.

use domain::StoreError;

/// PostgreSQL `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";
/// PostgreSQL `foreign_key_violation`.
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Maps a sqlx error onto the port's error type. Raw driver messages are
/// logged here and never passed on.
pub fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::Database(db_err) => {
            let constraint = db_err.constraint().unwrap_or_default().to_string();
            match db_err.code().as_deref() {
                Some(UNIQUE_VIOLATION) => StoreError::Duplicate(duplicate_field(&constraint)),
                Some(FOREIGN_KEY_VIOLATION) => {
                    StoreError::InvalidReference(referencing_field(&constraint))
                }
                _ => {
                    tracing::error!(error = %err, "Database error");
                    StoreError::Database("Database error".to_string())
                }
            }
        }
        _ => {
            tracing::error!(error = %err, "Database error");
            StoreError::Database("Database error".to_string())
        }
    }
}

/// Field named by a unique constraint, as the domain reports it.
fn duplicate_field(constraint: &str) -> String {
    match constraint {
        "application_users_normalized_user_name_key" => "userName",
        "application_users_normalized_email_key" => "email",
        "application_user_roles_user_role_key" => "roles",
        "external_credentials_provider_external_id_key" => "externalId",
        "content_blocks_slug_key" => "slug",
        other => other,
    }
    .to_string()
}

/// `projects_client_id_fkey` -> `clientId`.
fn referencing_field(constraint: &str) -> String {
    if constraint == "application_user_roles_application_role_id_fkey" {
        return "roles".to_string();
    }
    let column = constraint
        .strip_suffix("_fkey")
        .and_then(|rest| {
            ["_client_id", "_job_id", "_application_role_id", "_application_user_id"]
                .iter()
                .find(|suffix| rest.ends_with(*suffix))
                .map(|suffix| &suffix[1..])
        })
        .unwrap_or(constraint);

    let mut field = String::with_capacity(column.len());
    let mut upper = false;
    for c in column.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            field.push(c.to_ascii_uppercase());
            upper = false;
        } else {
            field.push(c);
        }
    }
    field
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_referencing_field() {
        assert_eq!(referencing_field("projects_client_id_fkey"), "clientId");
        assert_eq!(referencing_field("job_items_job_id_fkey"), "jobId");
        assert_eq!(
            referencing_field("application_user_roles_application_role_id_fkey"),
            "roles"
        );
        assert_eq!(
            referencing_field("external_credentials_application_user_id_fkey"),
            "applicationUserId"
        );
    }

    #[test]
    fn test_duplicate_field() {
        assert_eq!(duplicate_field("content_blocks_slug_key"), "slug");
        assert_eq!(duplicate_field("application_users_normalized_email_key"), "email");
        assert_eq!(duplicate_field("some_other_key"), "some_other_key");
    }

    #[test]
    fn test_row_not_found() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::RowNotFound),
            StoreError::NotFound
        ));
    }
}
