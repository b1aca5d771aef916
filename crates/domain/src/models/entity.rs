//! Entity capabilities.
//!
//! Every managed entity declares its identifier, its filterable fields, the
//! related data it can eager-load and whether it supports soft delete,
//! optimistic concurrency and change tracking. The generic services read
//! these declarations instead of inspecting types at runtime.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use shared::concurrency::ConcurrencyToken;
use validator::Validate;

/// Value type of a filterable/sortable field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Int,
    Text,
    Bool,
    /// Calendar date, `YYYY-MM-DD` on the wire.
    Date,
    /// Instant in UTC, RFC 3339 on the wire.
    Timestamp,
    /// Closed set of names, ordered by declaration.
    Enum(&'static [&'static str]),
}

/// A field that may appear in filter and sort expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    /// Wire (camelCase) name.
    pub name: &'static str,
    pub kind: FieldKind,
    pub nullable: bool,
}

impl FieldDef {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            nullable: false,
        }
    }

    pub const fn nullable(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            nullable: true,
        }
    }
}

static DEFAULT_ID: FieldDef = FieldDef::new("id", FieldKind::Int);

/// Static description of an entity type.
#[derive(Debug)]
pub struct EntitySchema {
    /// Resource name used in routes, e.g. `clients`.
    pub resource: &'static str,
    /// Type name used in log lines, e.g. `Client`.
    pub entity_name: &'static str,
    /// Field holding the identifier.
    pub id_field: &'static str,
    pub fields: &'static [FieldDef],
    /// Related data that may be requested through `includes`.
    pub includes: &'static [&'static str],
    /// Rows carry a `deleted` flag and are hidden once it is set.
    pub soft_delete: bool,
    /// Rows carry a concurrency token that must be echoed on update.
    pub versioned: bool,
}

impl EntitySchema {
    /// Looks a field up by name, ignoring ASCII case.
    pub fn field(&self, name: &str) -> Option<&'static FieldDef> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub fn id_def(&self) -> &'static FieldDef {
        self.field(self.id_field).unwrap_or(&DEFAULT_ID)
    }

    /// Looks an include up by name, ignoring ASCII case.
    pub fn include(&self, name: &str) -> Option<&'static str> {
        self.includes
            .iter()
            .copied()
            .find(|i| i.eq_ignore_ascii_case(name))
    }
}

/// A child row reconciled as part of its parent's write.
pub trait LinkedItem: Clone + std::fmt::Debug + Send + Sync + 'static {
    fn id(&self) -> i64;
    fn set_parent_id(&mut self, parent_id: i64);
}

/// Link type for entities without linked children.
#[derive(Debug, Clone, Serialize)]
pub enum NoLink {}

impl LinkedItem for NoLink {
    fn id(&self) -> i64 {
        match *self {}
    }

    fn set_parent_id(&mut self, _parent_id: i64) {
        match *self {}
    }
}

/// A record managed by the generic services.
pub trait Entity:
    Clone + std::fmt::Debug + Serialize + DeserializeOwned + Validate + Send + Sync + 'static
{
    type Link: LinkedItem;

    fn schema() -> &'static EntitySchema;

    fn id(&self) -> i64;

    fn set_id(&mut self, id: i64);

    /// Human readable name used when logging writes.
    fn display_name(&self) -> String {
        self.id().to_string()
    }

    /// Clears every navigation property so that a submitted object cannot
    /// carry writes to related entities.
    fn strip_navigation(&mut self);

    fn concurrency_token(&self) -> Option<&ConcurrencyToken> {
        None
    }

    fn set_concurrency_token(&mut self, _token: ConcurrencyToken) {}

    fn is_deleted(&self) -> bool {
        false
    }

    fn set_deleted(&mut self, _deleted: bool) {}

    /// Removes and returns linked children submitted inline with the entity.
    /// `None` means the children were not submitted at all.
    fn take_linked_items(&mut self) -> Option<Vec<Self::Link>> {
        None
    }
}

/// Entities whose writes append an audit row.
pub trait ChangeTracked: Entity {
    fn set_last_modification(&mut self, at: DateTime<Utc>);
}

#[cfg(test)]
mod tests {
    use super::*;

    static FIELDS: &[FieldDef] = &[
        FieldDef::new("id", FieldKind::Int),
        FieldDef::new("name", FieldKind::Text),
        FieldDef::nullable("endDate", FieldKind::Date),
    ];

    static SCHEMA: EntitySchema = EntitySchema {
        resource: "things",
        entity_name: "Thing",
        id_field: "id",
        fields: FIELDS,
        includes: &["trackedChanges"],
        soft_delete: false,
        versioned: false,
    };

    #[test]
    fn test_field_lookup_ignores_case() {
        assert_eq!(SCHEMA.field("EndDate").map(|f| f.name), Some("endDate"));
        assert!(SCHEMA.field("password").is_none());
    }

    #[test]
    fn test_include_lookup_normalizes_name() {
        assert_eq!(SCHEMA.include("TrackedChanges"), Some("trackedChanges"));
        assert_eq!(SCHEMA.include("projects"), None);
    }

    #[test]
    fn test_id_def() {
        assert_eq!(SCHEMA.id_def().name, "id");
        assert_eq!(SCHEMA.id_def().kind, FieldKind::Int);
    }
}
