// handlers/protected/demos.rs

use axum::extract::{rejection::JsonRejection, rejection::QueryRejection, Query};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::database::models::Demo;
use crate::database::pagination::{Page, PageQuery};
use crate::handlers::ApiPath;
use crate::middleware::{ApiResponse, ApiResult, ValidatedUser};
use crate::services::demo_service::{DemoDetail, DemoFilter, DemoInput};
use crate::services::{DemoService, MediaService};
use crate::types::DemoStatus;

#[derive(Debug, Deserialize)]
pub struct StatusChange {
    pub status: DemoStatus,
}

/// GET /api/demos - Staff see every demo, buyers their active assigned ones
///
/// Filters: `status`, `product_id`, search `q`.
pub async fn demos_get(
    Extension(user): Extension<ValidatedUser>,
    page: Result<Query<PageQuery>, QueryRejection>,
    filter: Result<Query<DemoFilter>, QueryRejection>,
) -> ApiResult<Page<Demo>> {
    let Query(page) = page?;
    let Query(filter) = filter?;
    let demos = DemoService::connect().await?;
    Ok(ApiResponse::success(demos.list(&user.actor(), &filter, &page).await?))
}

/// POST /api/demos - Create a demo under a product (admin)
pub async fn demos_post(
    Extension(user): Extension<ValidatedUser>,
    payload: Result<Json<DemoInput>, JsonRejection>,
) -> ApiResult<Demo> {
    let Json(input) = payload?;
    let demos = DemoService::connect().await?;
    Ok(ApiResponse::created(demos.create(&user.actor(), input).await?))
}

/// GET /api/demos/:id - Demo with product name and media; credentials redacted
/// for callers not allowed to see them
pub async fn demo_get(Extension(user): Extension<ValidatedUser>, ApiPath(id): ApiPath<Uuid>) -> ApiResult<DemoDetail> {
    let demos = DemoService::connect().await?;
    Ok(ApiResponse::success(demos.get(&user.actor(), id).await?))
}

/// PATCH /api/demos/:id - Update a demo; `"credentials": null` clears them (admin)
pub async fn demo_patch(
    Extension(user): Extension<ValidatedUser>,
    ApiPath(id): ApiPath<Uuid>,
    payload: Result<Json<DemoInput>, JsonRejection>,
) -> ApiResult<Demo> {
    let Json(input) = payload?;
    let demos = DemoService::connect().await?;
    Ok(ApiResponse::success(demos.update(&user.actor(), id, input).await?))
}

/// PUT /api/demos/:id/status - Activate or deactivate (admin)
pub async fn demo_status_put(
    Extension(user): Extension<ValidatedUser>,
    ApiPath(id): ApiPath<Uuid>,
    payload: Result<Json<StatusChange>, JsonRejection>,
) -> ApiResult<Demo> {
    let Json(change) = payload?;
    let demos = DemoService::connect().await?;
    Ok(ApiResponse::success(demos.set_status(&user.actor(), id, change.status).await?))
}

/// DELETE /api/demos/:id - Delete a demo, releasing its stored media (admin)
pub async fn demo_delete(Extension(user): Extension<ValidatedUser>, ApiPath(id): ApiPath<Uuid>) -> ApiResult<Value> {
    let demos = DemoService::connect().await?;
    let media = MediaService::connect().await?;
    demos.delete(&user.actor(), id, &media).await?;
    Ok(ApiResponse::deleted(id))
}
