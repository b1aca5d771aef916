//! Include list parsing.

use super::QueryError;
use crate::models::EntitySchema;

/// Parses a comma separated include list into the schema's canonical names.
pub fn parse_includes(
    input: Option<&str>,
    schema: &'static EntitySchema,
) -> Result<Vec<&'static str>, QueryError> {
    let mut includes = Vec::new();
    for name in input.unwrap_or_default().split(',').map(str::trim) {
        if name.is_empty() {
            continue;
        }
        let include = schema.include(name).ok_or_else(|| {
            QueryError::new(format!(
                "'{}' cannot be included with {}",
                name, schema.entity_name
            ))
        })?;
        if !includes.contains(&include) {
            includes.push(include);
        }
    }
    Ok(includes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Client, Entity, Job};

    #[test]
    fn test_includes_are_normalized_and_deduplicated() {
        let includes =
            parse_includes(Some("Projects, trackedchanges,,projects"), Client::schema()).unwrap();
        assert_eq!(includes, vec!["projects", "trackedChanges"]);
    }

    #[test]
    fn test_unknown_include() {
        assert!(parse_includes(Some("projects"), Job::schema()).is_err());
    }

    #[test]
    fn test_missing_input() {
        assert!(parse_includes(None, Client::schema()).unwrap().is_empty());
    }
}
