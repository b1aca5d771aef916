//! Sort order parsing: `field [asc|desc], field [asc|desc], ...`.

use super::QueryError;
use crate::models::{EntitySchema, FieldDef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: &'static FieldDef,
    pub descending: bool,
}

/// Parses an order string against the schema's declared fields.
///
/// Blank input yields no keys; stores always finish with the identifier so
/// that paging is stable.
pub fn parse_sort(
    input: Option<&str>,
    schema: &'static EntitySchema,
) -> Result<Vec<SortKey>, QueryError> {
    let Some(input) = input else {
        return Ok(Vec::new());
    };

    let mut keys = Vec::new();
    for segment in input.split(',') {
        let mut words = segment.split_whitespace();
        let Some(name) = words.next() else {
            continue;
        };

        let field = schema
            .field(name)
            .ok_or_else(|| QueryError::new(format!("Unknown sort field '{}'", name)))?;

        let descending = match words.next().map(str::to_ascii_lowercase).as_deref() {
            None | Some("asc") | Some("ascending") => false,
            Some("desc") | Some("descending") => true,
            Some(other) => {
                return Err(QueryError::new(format!(
                    "Invalid sort direction '{}' for '{}'",
                    other, field.name
                )))
            }
        };

        if let Some(extra) = words.next() {
            return Err(QueryError::new(format!(
                "Unexpected '{}' in sort order",
                extra
            )));
        }

        keys.push(SortKey { field, descending });
    }

    Ok(keys)
}
