//! Rendering of content blocks by slug.

use std::collections::HashMap;

use crate::error::ServiceError;
use crate::models::{ContentBlock, ContentData, Entity};
use crate::query::{CompareOp, Literal, Predicate};

use super::access::Caller;
use super::list::ListService;

/// Replaces every `%token%` occurrence with its value. Unknown tokens are
/// left in place.
pub fn substitute_tokens(template: &str, tokens: &HashMap<String, String>) -> String {
    tokens.iter().fold(template.to_string(), |text, (token, value)| {
        text.replace(&format!("%{}%", token), value)
    })
}

#[derive(Clone)]
pub struct ContentService {
    list: ListService<ContentBlock>,
}

impl ContentService {
    pub fn new(list: ListService<ContentBlock>) -> Self {
        Self { list }
    }

    /// The block with the given slug, if the caller can see it.
    pub async fn find_by_slug(
        &self,
        caller: &Caller,
        slug: &str,
    ) -> Result<Option<ContentBlock>, ServiceError> {
        let principal = self.list.principal(caller).await?;
        let Some(mut query) = self.list.secured_query(principal.as_ref()) else {
            return Ok(None);
        };

        let schema = ContentBlock::schema();
        let Some(field) = schema.field("slug") else {
            return Ok(None);
        };
        query = query.and_where(Predicate::Compare {
            field,
            op: CompareOp::Eq,
            value: Literal::Text(slug.to_string()),
        });
        query.limit = Some(1);

        Ok(self.list.store.fetch(&query).await?.pop())
    }

    /// Renders the block's title and template with the supplied tokens.
    pub async fn content_data(
        &self,
        caller: &Caller,
        slug: &str,
        tokens: &HashMap<String, String>,
    ) -> Result<ContentData, ServiceError> {
        let block = self
            .find_by_slug(caller, slug)
            .await?
            .ok_or(ServiceError::NotFound)?;

        Ok(ContentData {
            slug: block.slug,
            title: substitute_tokens(&block.title, tokens),
            content: substitute_tokens(&block.value, tokens),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDataContext;
    use crate::services::managed::ManagedEntity;

    fn tokens(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_substitute_tokens() {
        let text = substitute_tokens(
            "Hi %firstName%, welcome to %site%. %unknown% stays.",
            &tokens(&[("firstName", "Ada"), ("site", "Acme")]),
        );
        assert_eq!(text, "Hi Ada, welcome to Acme. %unknown% stays.");
    }

    #[tokio::test]
    async fn test_content_data_renders_seeded_block() {
        let ctx = MemoryDataContext::seeded();
        let service = ContentService::new(ContentBlock::list_service(&ctx));

        let data = service
            .content_data(
                &Caller::anonymous(),
                "welcome-email",
                &tokens(&[("firstName", "Ada")]),
            )
            .await
            .unwrap();
        assert_eq!(data.slug, "welcome-email");
        assert!(data.title.contains("Ada"));
        assert!(data.content.contains("Ada"));
        assert!(!data.content.contains("%firstName%"));
    }

    #[tokio::test]
    async fn test_unknown_slug_is_not_found() {
        let ctx = MemoryDataContext::seeded();
        let service = ContentService::new(ContentBlock::list_service(&ctx));

        let err = service
            .content_data(&Caller::anonymous(), "missing", &HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound));
    }
}
