// handlers/protected/storage.rs

use axum::{extract::rejection::JsonRejection, Extension, Json};
use serde::Deserialize;
use uuid::Uuid;

use crate::handlers::ApiPath;
use crate::middleware::{ApiResponse, ApiResult, ValidatedUser};
use crate::services::storage_service::StorageSummary;
use crate::services::StorageService;

#[derive(Debug, Deserialize)]
pub struct LimitChange {
    pub limit_bytes: i64,
}

/// GET /api/storage - The caller's own usage
pub async fn storage_get(Extension(user): Extension<ValidatedUser>) -> ApiResult<StorageSummary> {
    let actor = user.actor();
    let storage = StorageService::connect().await?;
    Ok(ApiResponse::success(storage.usage(&actor, actor.id).await?))
}

/// GET /api/storage/:user_id - Another user's usage (admin)
pub async fn user_storage_get(
    Extension(user): Extension<ValidatedUser>,
    ApiPath(user_id): ApiPath<Uuid>,
) -> ApiResult<StorageSummary> {
    let storage = StorageService::connect().await?;
    Ok(ApiResponse::success(storage.usage(&user.actor(), user_id).await?))
}

/// PUT /api/storage/:user_id/limit - Change a user's quota (admin)
pub async fn user_storage_limit_put(
    Extension(user): Extension<ValidatedUser>,
    ApiPath(user_id): ApiPath<Uuid>,
    payload: Result<Json<LimitChange>, JsonRejection>,
) -> ApiResult<StorageSummary> {
    let Json(change) = payload?;
    let storage = StorageService::connect().await?;
    Ok(ApiResponse::success(
        storage.set_limit(&user.actor(), user_id, change.limit_bytes).await?,
    ))
}
