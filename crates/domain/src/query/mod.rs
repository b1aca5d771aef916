//! Caller-supplied query strings: filter, sort order and includes.
//!
//! Strings are parsed into an expression tree and then resolved against an
//! [`EntitySchema`]; anything not declared there is rejected with a
//! [`QueryError`]. Stores receive only the resolved [`EntityQuery`].

pub mod filter;
pub mod include;
pub mod predicate;
pub mod sort;

use thiserror::Error;

use crate::error::ServiceError;
use crate::models::EntitySchema;

pub use filter::{CompareOp, TextOp};
pub use include::parse_includes;
pub use predicate::{Literal, Predicate};
pub use sort::{parse_sort, SortKey};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct QueryError(String);

impl QueryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<QueryError> for ServiceError {
    fn from(err: QueryError) -> Self {
        ServiceError::InvalidQuery(err.0)
    }
}

/// Paging and query strings for a list request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListParams {
    pub offset: i64,
    pub limit: i64,
    pub order: Option<String>,
    pub includes: Option<String>,
    pub filter: Option<String>,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 10,
            order: None,
            includes: None,
            filter: None,
        }
    }
}

/// A fully resolved query handed to an entity store.
#[derive(Debug, Clone, Default)]
pub struct EntityQuery {
    pub predicate: Option<Predicate>,
    pub sort: Vec<SortKey>,
    pub includes: Vec<&'static str>,
    pub offset: i64,
    /// `None` means no limit.
    pub limit: Option<i64>,
}

impl EntityQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a conjunct to the query's predicate.
    pub fn and_where(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(match self.predicate.take() {
            Some(existing) => Predicate::And(Box::new(existing), Box::new(predicate)),
            None => predicate,
        });
        self
    }

    /// Query matching the row with the given identifier.
    pub fn by_id(schema: &'static EntitySchema, id: i64) -> Self {
        Self::new().and_where(Predicate::id_eq(schema, id))
    }

    /// Query hiding soft-deleted rows, when the schema has them.
    pub fn live(schema: &'static EntitySchema) -> Self {
        let query = Self::new();
        match schema.field("deleted") {
            Some(field) if schema.soft_delete => query.and_where(Predicate::Compare {
                field,
                op: CompareOp::Eq,
                value: Literal::Bool(false),
            }),
            _ => query,
        }
    }
}

/// Parses and resolves a filter string. Blank input means no filter.
pub fn parse_filter(
    input: Option<&str>,
    schema: &'static EntitySchema,
) -> Result<Option<Predicate>, QueryError> {
    match input.map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => {
            let expr = filter::parse(text)?;
            Predicate::compile(&expr, schema).map(Some)
        }
    }
}
