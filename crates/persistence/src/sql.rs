//! Compilation of resolved queries into parameterized SQL.
//!
//! Only column names derived from schema fields and fixed keywords are ever
//! written into the statement text; every literal travels as a bind
//! parameter.

use chrono::{DateTime, NaiveDate, Utc};
use domain::models::FieldDef;
use domain::query::{CompareOp, EntityQuery, Literal, Predicate, SortKey, TextOp};

/// A value bound to a `$n` placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    BigInt(i64),
    SmallInt(i16),
    Text(String),
    Bool(bool),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
}

impl From<&Literal> for SqlValue {
    fn from(literal: &Literal) -> Self {
        match literal {
            Literal::Int(v) => SqlValue::BigInt(*v),
            Literal::Text(v) => SqlValue::Text(v.clone()),
            Literal::Bool(v) => SqlValue::Bool(*v),
            Literal::Date(v) => SqlValue::Date(*v),
            Literal::Timestamp(v) => SqlValue::Timestamp(*v),
            Literal::Enum(ordinal) => SqlValue::SmallInt(i16::try_from(*ordinal).unwrap_or(i16::MAX)),
        }
    }
}

/// Binds a slice of [`SqlValue`]s, in order, to a sqlx query builder.
macro_rules! bind_values {
    ($builder:expr, $values:expr) => {{
        let mut b = $builder;
        for value in $values {
            b = match value {
                $crate::sql::SqlValue::BigInt(v) => b.bind(*v),
                $crate::sql::SqlValue::SmallInt(v) => b.bind(*v),
                $crate::sql::SqlValue::Text(v) => b.bind(v.clone()),
                $crate::sql::SqlValue::Bool(v) => b.bind(*v),
                $crate::sql::SqlValue::Date(v) => b.bind(*v),
                $crate::sql::SqlValue::Timestamp(v) => b.bind(*v),
            };
        }
        b
    }};
}
pub(crate) use bind_values;

/// `lastModification` -> `last_modification`.
pub fn column_name(field: &FieldDef) -> String {
    let mut column = String::with_capacity(field.name.len() + 4);
    for c in field.name.chars() {
        if c.is_ascii_uppercase() {
            column.push('_');
            column.push(c.to_ascii_lowercase());
        } else {
            column.push(c);
        }
    }
    column
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Accumulates placeholders and their values.
#[derive(Debug, Default)]
pub struct SqlBuilder {
    pub values: Vec<SqlValue>,
}

impl SqlBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn placeholder(&mut self, value: SqlValue) -> String {
        self.values.push(value);
        format!("${}", self.values.len())
    }

    /// Renders a predicate as a boolean SQL expression.
    pub fn predicate(&mut self, predicate: &Predicate) -> String {
        match predicate {
            Predicate::Compare { field, op, value } => {
                let op = match op {
                    CompareOp::Eq => "=",
                    CompareOp::Ne => "<>",
                    CompareOp::Lt => "<",
                    CompareOp::Le => "<=",
                    CompareOp::Gt => ">",
                    CompareOp::Ge => ">=",
                };
                let param = self.placeholder(SqlValue::from(value));
                format!("{} {} {}", column_name(field), op, param)
            }
            Predicate::IsNull { field, negated } => format!(
                "{} IS {}NULL",
                column_name(field),
                if *negated { "NOT " } else { "" }
            ),
            Predicate::Text { field, op, value } => {
                let value = escape_like(value);
                let pattern = match op {
                    TextOp::Contains => format!("%{}%", value),
                    TextOp::StartsWith => format!("{}%", value),
                    TextOp::EndsWith => format!("%{}", value),
                };
                let param = self.placeholder(SqlValue::Text(pattern));
                format!("{} LIKE {} ESCAPE '\\'", column_name(field), param)
            }
            Predicate::And(left, right) => {
                format!("({} AND {})", self.predicate(left), self.predicate(right))
            }
            Predicate::Or(left, right) => {
                format!("({} OR {})", self.predicate(left), self.predicate(right))
            }
            Predicate::Not(inner) => format!("NOT ({})", self.predicate(inner)),
        }
    }

    /// ` WHERE ...`, or nothing when the query is unfiltered.
    pub fn where_clause(&mut self, query: &EntityQuery) -> String {
        match &query.predicate {
            Some(predicate) => format!(" WHERE {}", self.predicate(predicate)),
            None => String::new(),
        }
    }

    /// ` LIMIT $n OFFSET $m`, skipping the parts that are not needed.
    pub fn paging(&mut self, query: &EntityQuery) -> String {
        let mut sql = String::new();
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {}", self.placeholder(SqlValue::BigInt(limit.max(0)))));
        }
        if query.offset > 0 {
            sql.push_str(&format!(" OFFSET {}", self.placeholder(SqlValue::BigInt(query.offset))));
        }
        sql
    }
}

/// ` ORDER BY ...`, always finishing with the id column.
pub fn order_by(sort: &[SortKey], id_column: &str) -> String {
    let mut terms: Vec<String> = sort
        .iter()
        .map(|key| {
            format!(
                "{} {}",
                column_name(key.field),
                if key.descending { "DESC" } else { "ASC" }
            )
        })
        .collect();
    if !sort.iter().any(|key| column_name(key.field) == id_column) {
        terms.push(format!("{} ASC", id_column));
    }
    format!(" ORDER BY {}", terms.join(", "))
}

/// A `SELECT` over `source` for the given query.
pub fn select(columns: &str, source: &str, id_column: &str, query: &EntityQuery) -> (String, Vec<SqlValue>) {
    let mut builder = SqlBuilder::new();
    let mut sql = format!("SELECT {} FROM {}", columns, source);
    sql.push_str(&builder.where_clause(query));
    sql.push_str(&order_by(&query.sort, id_column));
    sql.push_str(&builder.paging(query));
    (sql, builder.values)
}

/// A count of the rows matching the query, stopping at `cap` rows.
pub fn count(source: &str, query: &EntityQuery, cap: Option<i64>) -> (String, Vec<SqlValue>) {
    let mut builder = SqlBuilder::new();
    let filter = builder.where_clause(query);
    let sql = match cap {
        Some(cap) => {
            let limit = builder.placeholder(SqlValue::BigInt(cap.max(0)));
            format!(
                "SELECT COUNT(*) FROM (SELECT 1 FROM {}{} LIMIT {}) AS capped",
                source, filter, limit
            )
        }
        None => format!("SELECT COUNT(*) FROM {}{}", source, filter),
    };
    (sql, builder.values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::models::{Client, Entity, Project};
    use domain::query::{parse_filter, parse_sort};

    fn project_query(filter: &str) -> EntityQuery {
        EntityQuery::live(Project::schema())
            .and_where(parse_filter(Some(filter), Project::schema()).unwrap().unwrap())
    }

    #[test]
    fn test_column_names() {
        let schema = Project::schema();
        assert_eq!(column_name(schema.field("clientId").unwrap()), "client_id");
        assert_eq!(column_name(schema.field("lastModification").unwrap()), "last_modification");
        assert_eq!(column_name(schema.field("name").unwrap()), "name");
    }

    #[test]
    fn test_literals_are_bound_not_inlined() {
        let query = project_query(r#"name == "x'; DROP TABLE projects; --" and state == "Closed""#);
        let (sql, values) = select("*", "projects", "id", &query);
        assert!(!sql.contains("DROP"));
        assert_eq!(
            sql,
            "SELECT * FROM projects WHERE (deleted = $1 AND (name = $2 AND state = $3)) ORDER BY id ASC"
        );
        assert_eq!(values[0], SqlValue::Bool(false));
        assert_eq!(values[2], SqlValue::SmallInt(2));
    }

    #[test]
    fn test_null_and_text_predicates() {
        let query = project_query(r#"lastModification != null or name.Contains("50%")"#);
        let (sql, values) = select("*", "projects", "id", &query);
        assert!(sql.contains("last_modification IS NOT NULL"));
        assert!(sql.contains("name LIKE $2 ESCAPE '\\'"));
        assert_eq!(values[1], SqlValue::Text("%50\\%%".to_string()));
    }

    #[test]
    fn test_order_and_paging() {
        let mut query = EntityQuery::new();
        query.sort = parse_sort(Some("name desc, id"), Client::schema()).unwrap();
        query.offset = 20;
        query.limit = Some(10);
        let (sql, values) = select("*", "clients", "id", &query);
        assert_eq!(
            sql,
            "SELECT * FROM clients ORDER BY name DESC, id ASC LIMIT $1 OFFSET $2"
        );
        assert_eq!(values, vec![SqlValue::BigInt(10), SqlValue::BigInt(20)]);
    }

    #[test]
    fn test_capped_count() {
        let query = EntityQuery::live(Client::schema());
        let (sql, values) = count("clients", &query, Some(40));
        assert_eq!(
            sql,
            "SELECT COUNT(*) FROM (SELECT 1 FROM clients WHERE deleted = $1 LIMIT $2) AS capped"
        );
        assert_eq!(values.len(), 2);

        let (sql, _) = count("clients", &query, None);
        assert_eq!(sql, "SELECT COUNT(*) FROM clients WHERE deleted = $1");
    }
}
