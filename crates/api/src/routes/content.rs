//! Content block rendering by slug.

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    Json,
};

use domain::models::{ContentBlock, ContentData};
use domain::services::{ContentService, ManagedEntity};

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::AuthenticatedCaller;

/// Render a content block, substituting `%token%` placeholders with the
/// query string values.
///
/// GET /api/contentBlocks/slug/:slug?token=value
pub async fn content_by_slug(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Path(slug): Path<String>,
    Query(tokens): Query<HashMap<String, String>>,
) -> Result<Json<ContentData>, ApiError> {
    let service = ContentService::new(ContentBlock::list_service(state.ctx.as_ref()));
    let data = service.content_data(&caller, &slug, &tokens).await?;
    Ok(Json(data))
}
