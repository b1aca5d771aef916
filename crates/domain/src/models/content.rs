//! Editable content blocks with `%token%` substitution.

use serde::{Deserialize, Serialize};
use shared::concurrency::ConcurrencyToken;
use validator::{Validate, ValidationError};

use super::entity::{Entity, EntitySchema, FieldDef, FieldKind, NoLink};

lazy_static::lazy_static! {
    pub static ref SLUG_REGEX: regex::Regex = regex::Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").unwrap();
}

fn validate_slug(slug: &str) -> Result<(), ValidationError> {
    if SLUG_REGEX.is_match(slug) {
        Ok(())
    } else {
        let mut err = ValidationError::new("invalid_slug");
        err.message =
            Some("Slug may only contain lowercase letters, digits and single hyphens".into());
        Err(err)
    }
}

/// A substitution token a block's template may reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowedToken {
    pub token: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ContentBlock {
    #[serde(default)]
    pub id: i64,

    #[validate(length(min = 1, max = 100, message = "Slug must be between 1 and 100 characters"))]
    #[validate(custom(function = "validate_slug"))]
    pub slug: String,

    #[serde(default)]
    pub is_page: bool,

    #[validate(length(max = 500, message = "Description cannot exceed 500 characters"))]
    #[serde(default)]
    pub description: String,

    #[validate(length(max = 200, message = "Title cannot exceed 200 characters"))]
    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub value: String,

    #[serde(default)]
    pub allowed_tokens: Vec<AllowedToken>,

    #[serde(default)]
    pub concurrency_token: Option<ConcurrencyToken>,
}

static CONTENT_BLOCK_FIELDS: &[FieldDef] = &[
    FieldDef::new("id", FieldKind::Int),
    FieldDef::new("slug", FieldKind::Text),
    FieldDef::new("isPage", FieldKind::Bool),
    FieldDef::new("title", FieldKind::Text),
    FieldDef::new("description", FieldKind::Text),
];

static CONTENT_BLOCK_SCHEMA: EntitySchema = EntitySchema {
    resource: "contentBlocks",
    entity_name: "ContentBlock",
    id_field: "id",
    fields: CONTENT_BLOCK_FIELDS,
    includes: &[],
    soft_delete: false,
    versioned: true,
};

impl Entity for ContentBlock {
    type Link = NoLink;

    fn schema() -> &'static EntitySchema {
        &CONTENT_BLOCK_SCHEMA
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn display_name(&self) -> String {
        self.slug.clone()
    }

    fn strip_navigation(&mut self) {}

    fn concurrency_token(&self) -> Option<&ConcurrencyToken> {
        self.concurrency_token.as_ref()
    }

    fn set_concurrency_token(&mut self, token: ConcurrencyToken) {
        self.concurrency_token = Some(token);
    }
}

/// A rendered content block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentData {
    pub slug: String,
    pub title: String,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_regex() {
        assert!(SLUG_REGEX.is_match("welcome-email"));
        assert!(SLUG_REGEX.is_match("about"));
        assert!(!SLUG_REGEX.is_match("Welcome"));
        assert!(!SLUG_REGEX.is_match("double--hyphen"));
        assert!(!SLUG_REGEX.is_match("-leading"));
    }

    #[test]
    fn test_invalid_slug_fails_validation() {
        let block = ContentBlock {
            slug: "Not A Slug".to_string(),
            ..Default::default()
        };
        let errors = block.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("slug"));
    }
}
