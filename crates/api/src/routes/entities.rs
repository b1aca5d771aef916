//! Generic endpoint handlers shared by every managed entity.
//!
//! Each handler is instantiated once per entity type by
//! [`crate::app::entity_routes`]; all rules live in the domain services.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use domain::query::ListParams;
use domain::services::ManagedEntity;

use super::patch::{apply_patch, PatchOperation};
use crate::app::AppState;
use crate::config::QueryConfig;
use crate::error::ApiError;
use crate::extractors::AuthenticatedCaller;

pub const TOTAL_COUNT_HEADER: HeaderName = HeaderName::from_static("x-total-count");
pub const TOTAL_COUNT_MAX_HEADER: HeaderName = HeaderName::from_static("x-total-count-max");

/// Query string of a list request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub offset: Option<i64>,
    pub limit: Option<i64>,
    pub order: Option<String>,
    pub includes: Option<String>,
    pub filter: Option<String>,
    /// Upper bound for counting. Negative counts everything.
    pub max_count: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct IncludesQuery {
    pub includes: Option<String>,
}

impl ListQuery {
    /// Resolves paging defaults. Returns the list parameters and the count
    /// cap, `None` meaning uncapped.
    pub fn resolve(self, config: &QueryConfig) -> Result<(ListParams, Option<i64>), ApiError> {
        let offset = self.offset.unwrap_or(0);
        if offset < 0 {
            return Err(ApiError::InvalidQuery("offset must not be negative".into()));
        }
        let limit = self.limit.unwrap_or(config.default_limit);
        if limit < 0 {
            return Err(ApiError::InvalidQuery("limit must not be negative".into()));
        }
        let limit = limit.min(config.max_limit);

        let cap = match self.max_count {
            None => Some(offset.saturating_add(limit.saturating_mul(config.count_multiplier))),
            Some(max) if max >= 0 => Some(max),
            Some(_) => None,
        };

        let params = ListParams {
            offset,
            limit,
            order: self.order,
            includes: self.includes,
            filter: self.filter,
        };
        Ok((params, cap))
    }
}

fn query_rejection(rejection: QueryRejection) -> ApiError {
    ApiError::InvalidQuery(rejection.body_text())
}

fn body_rejection(rejection: JsonRejection) -> ApiError {
    ApiError::validation("body", rejection.body_text())
}

fn path_rejection(_rejection: PathRejection) -> ApiError {
    ApiError::NotFound("Item not found".into())
}

fn header_value(value: i64) -> HeaderValue {
    HeaderValue::from(value)
}

/// List items.
///
/// GET /api/{resource}?offset&limit&order&includes&filter&maxCount
pub async fn list<E: ManagedEntity>(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query.map_err(query_rejection)?;
    let (params, cap) = query.resolve(&state.query)?;

    let service = E::list_service(state.ctx.as_ref());
    let items = service.get_all(&caller, &params).await?;
    let total = service
        .get_all_count(&caller, params.filter.as_deref(), cap.unwrap_or(-1))
        .await?;

    let mut headers = HeaderMap::new();
    headers.insert(TOTAL_COUNT_HEADER, header_value(total));
    if let Some(cap) = cap {
        headers.insert(TOTAL_COUNT_MAX_HEADER, header_value(cap));
    }

    Ok((headers, Json(items)).into_response())
}

/// Get one item.
///
/// GET /api/{resource}/:id?includes
pub async fn get_one<E: ManagedEntity>(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    id: Result<Path<i64>, PathRejection>,
    query: Result<Query<IncludesQuery>, QueryRejection>,
) -> Result<Json<E>, ApiError> {
    let Path(id) = id.map_err(path_rejection)?;
    let Query(query) = query.map_err(query_rejection)?;

    E::read_service(state.ctx.as_ref())
        .get_one(&caller, id, query.includes.as_deref())
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Item not found".into()))
}

/// Create an item.
///
/// POST /api/{resource}
pub async fn create<E: ManagedEntity>(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    body: Result<Json<E>, JsonRejection>,
) -> Result<(StatusCode, Json<E>), ApiError> {
    let Json(entity) = body.map_err(body_rejection)?;

    let saved = E::write_service(state.ctx.as_ref())
        .create(&caller, entity)
        .await?;
    Ok((StatusCode::CREATED, Json(saved)))
}

/// Replace an item.
///
/// PUT /api/{resource}/:id
pub async fn update<E: ManagedEntity>(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    id: Result<Path<i64>, PathRejection>,
    body: Result<Json<E>, JsonRejection>,
) -> Result<Json<E>, ApiError> {
    let Path(id) = id.map_err(path_rejection)?;
    let Json(entity) = body.map_err(body_rejection)?;

    let saved = E::write_service(state.ctx.as_ref())
        .update(&caller, id, entity)
        .await?;
    Ok(Json(saved))
}

/// Apply a JSON Patch document to an item.
///
/// PATCH /api/{resource}/:id
pub async fn patch<E: ManagedEntity>(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    id: Result<Path<i64>, PathRejection>,
    body: Result<Json<Vec<PatchOperation>>, JsonRejection>,
) -> Result<Json<E>, ApiError> {
    let Path(id) = id.map_err(path_rejection)?;
    let Json(operations) = body.map_err(body_rejection)?;

    let service = E::write_service(state.ctx.as_ref());
    let current = service
        .read()
        .get_one(&caller, id, None)
        .await?
        .ok_or_else(|| ApiError::NotFound("Item not found".into()))?;

    let document =
        serde_json::to_value(&current).map_err(|e| ApiError::Internal(e.to_string()))?;
    let patched = apply_patch(&document, operations)?;
    let entity: E = serde_json::from_value(patched)
        .map_err(|e| ApiError::validation("body", e.to_string()))?;

    let saved = service.update(&caller, id, entity).await?;
    Ok(Json(saved))
}

/// Delete an item.
///
/// DELETE /api/{resource}/:id
pub async fn delete<E: ManagedEntity>(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    id: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = id.map_err(path_rejection)?;

    E::write_service(state.ctx.as_ref())
        .delete(&caller, id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
