//! Content block entity (database row mapping).

use shared::concurrency::ConcurrencyToken;
use sqlx::types::Json;
use sqlx::FromRow;

use domain::models::{AllowedToken, ContentBlock};

/// Database row mapping for the content_blocks table.
#[derive(Debug, Clone, FromRow)]
pub struct ContentBlockEntity {
    pub id: i64,
    pub slug: String,
    pub is_page: bool,
    pub description: String,
    pub title: String,
    pub value: String,
    pub allowed_tokens: Json<Vec<AllowedToken>>,
    pub version: i64,
}

impl From<ContentBlockEntity> for ContentBlock {
    fn from(entity: ContentBlockEntity) -> Self {
        Self {
            id: entity.id,
            slug: entity.slug,
            is_page: entity.is_page,
            description: entity.description,
            title: entity.title,
            value: entity.value,
            allowed_tokens: entity.allowed_tokens.0,
            concurrency_token: Some(ConcurrencyToken::from_version(entity.version)),
        }
    }
}
