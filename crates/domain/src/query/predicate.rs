//! Typed predicates resolved against an entity schema.
//!
//! A [`Predicate`] only ever references [`FieldDef`]s taken from the schema,
//! with literals already converted to the field's type. The SQL store
//! compiles it to a parameterized `WHERE` clause; the in-memory store
//! evaluates it natively over the entity's JSON form with SQL null
//! semantics.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde_json::Value;
use std::cmp::Ordering;

use super::filter::{CompareOp, FilterExpr, LogicalOp, RawLiteral, TextOp};
use super::QueryError;
use crate::models::{EntitySchema, FieldDef, FieldKind};

/// A literal typed for the field it is compared against.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Text(String),
    Bool(bool),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    /// Ordinal of an enum variant.
    Enum(usize),
}

impl Literal {
    /// Reads a field value from an entity's JSON form. `None` for null.
    pub fn from_json(kind: FieldKind, value: &Value) -> Option<Literal> {
        match kind {
            FieldKind::Int => value.as_i64().map(Literal::Int),
            FieldKind::Text => value.as_str().map(|s| Literal::Text(s.to_string())),
            FieldKind::Bool => value.as_bool().map(Literal::Bool),
            FieldKind::Date => value
                .as_str()
                .and_then(|s| s.parse::<NaiveDate>().ok())
                .map(Literal::Date),
            FieldKind::Timestamp => value
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| Literal::Timestamp(dt.with_timezone(&Utc))),
            FieldKind::Enum(names) => value
                .as_str()
                .and_then(|s| names.iter().position(|n| n.eq_ignore_ascii_case(s)))
                .map(Literal::Enum),
        }
    }

    /// Orders two literals of the same type.
    pub fn compare(&self, other: &Literal) -> Option<Ordering> {
        match (self, other) {
            (Literal::Int(a), Literal::Int(b)) => Some(a.cmp(b)),
            (Literal::Text(a), Literal::Text(b)) => Some(a.cmp(b)),
            (Literal::Bool(a), Literal::Bool(b)) => Some(a.cmp(b)),
            (Literal::Date(a), Literal::Date(b)) => Some(a.cmp(b)),
            (Literal::Timestamp(a), Literal::Timestamp(b)) => Some(a.cmp(b)),
            (Literal::Enum(a), Literal::Enum(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    fn coerce(field: &FieldDef, raw: &RawLiteral) -> Result<Literal, QueryError> {
        let mismatch = || {
            QueryError::new(format!(
                "Value {:?} is not valid for field '{}'",
                raw, field.name
            ))
        };

        match (field.kind, raw) {
            (FieldKind::Int, RawLiteral::Number(n)) => {
                n.parse::<i64>().map(Literal::Int).map_err(|_| mismatch())
            }
            (FieldKind::Text, RawLiteral::Text(s)) => Ok(Literal::Text(s.clone())),
            (FieldKind::Bool, RawLiteral::Bool(b)) => Ok(Literal::Bool(*b)),
            (FieldKind::Date, RawLiteral::Text(s)) => s
                .parse::<NaiveDate>()
                .map(Literal::Date)
                .map_err(|_| mismatch()),
            (FieldKind::Timestamp, RawLiteral::Text(s)) => parse_timestamp(s)
                .map(Literal::Timestamp)
                .ok_or_else(mismatch),
            (FieldKind::Enum(names), RawLiteral::Text(s)) => names
                .iter()
                .position(|n| n.eq_ignore_ascii_case(s))
                .map(Literal::Enum)
                .ok_or_else(mismatch),
            (FieldKind::Enum(names), RawLiteral::Number(n)) => n
                .parse::<usize>()
                .ok()
                .filter(|i| *i < names.len())
                .map(Literal::Enum)
                .ok_or_else(mismatch),
            _ => Err(mismatch()),
        }
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    s.parse::<NaiveDate>()
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        field: &'static FieldDef,
        op: CompareOp,
        value: Literal,
    },
    IsNull {
        field: &'static FieldDef,
        negated: bool,
    },
    Text {
        field: &'static FieldDef,
        op: TextOp,
        value: String,
    },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    /// Matches the row whose identifier equals `id`.
    pub fn id_eq(schema: &'static EntitySchema, id: i64) -> Self {
        Predicate::Compare {
            field: schema.id_def(),
            op: CompareOp::Eq,
            value: Literal::Int(id),
        }
    }

    /// Resolves a parsed expression against the schema's declared fields.
    pub fn compile(expr: &FilterExpr, schema: &'static EntitySchema) -> Result<Self, QueryError> {
        let resolve = |name: &str| {
            schema
                .field(name)
                .ok_or_else(|| QueryError::new(format!("Unknown field '{}'", name)))
        };

        match expr {
            FilterExpr::Compare { field, op, value } => {
                let field = resolve(field)?;
                match (value, op) {
                    (RawLiteral::Null, CompareOp::Eq) => Ok(Predicate::IsNull {
                        field,
                        negated: false,
                    }),
                    (RawLiteral::Null, CompareOp::Ne) => Ok(Predicate::IsNull {
                        field,
                        negated: true,
                    }),
                    (RawLiteral::Null, _) => Err(QueryError::new(format!(
                        "Only == and != may compare '{}' with null",
                        field.name
                    ))),
                    _ => Ok(Predicate::Compare {
                        field,
                        op: *op,
                        value: Literal::coerce(field, value)?,
                    }),
                }
            }
            FilterExpr::Text { field, op, value } => {
                let field = resolve(field)?;
                if field.kind != FieldKind::Text {
                    return Err(QueryError::new(format!(
                        "Text methods are not available on '{}'",
                        field.name
                    )));
                }
                Ok(Predicate::Text {
                    field,
                    op: *op,
                    value: value.clone(),
                })
            }
            FilterExpr::Logical { left, op, right } => {
                let left = Box::new(Self::compile(left, schema)?);
                let right = Box::new(Self::compile(right, schema)?);
                Ok(match op {
                    LogicalOp::And => Predicate::And(left, right),
                    LogicalOp::Or => Predicate::Or(left, right),
                })
            }
            FilterExpr::Not(inner) => Ok(Predicate::Not(Box::new(Self::compile(inner, schema)?))),
            FilterExpr::Group(inner) => Self::compile(inner, schema),
        }
    }

    /// Evaluates against an entity's JSON form. `None` is SQL's unknown.
    pub fn evaluate(&self, item: &Value) -> Option<bool> {
        match self {
            Predicate::Compare { field, op, value } => {
                let actual = item
                    .get(field.name)
                    .and_then(|v| Literal::from_json(field.kind, v))?;
                let ordering = actual.compare(value)?;
                Some(match op {
                    CompareOp::Eq => ordering == Ordering::Equal,
                    CompareOp::Ne => ordering != Ordering::Equal,
                    CompareOp::Lt => ordering == Ordering::Less,
                    CompareOp::Le => ordering != Ordering::Greater,
                    CompareOp::Gt => ordering == Ordering::Greater,
                    CompareOp::Ge => ordering != Ordering::Less,
                })
            }
            Predicate::IsNull { field, negated } => {
                let is_null = item.get(field.name).map_or(true, Value::is_null);
                Some(is_null != *negated)
            }
            Predicate::Text { field, op, value } => {
                let actual = item.get(field.name)?.as_str()?;
                Some(match op {
                    TextOp::Contains => actual.contains(value.as_str()),
                    TextOp::StartsWith => actual.starts_with(value.as_str()),
                    TextOp::EndsWith => actual.ends_with(value.as_str()),
                })
            }
            Predicate::And(left, right) => match (left.evaluate(item), right.evaluate(item)) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            },
            Predicate::Or(left, right) => match (left.evaluate(item), right.evaluate(item)) {
                (Some(true), _) | (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            },
            Predicate::Not(inner) => inner.evaluate(item).map(|b| !b),
        }
    }

    /// True only when the predicate definitely holds.
    pub fn matches(&self, item: &Value) -> bool {
        self.evaluate(item) == Some(true)
    }
}
