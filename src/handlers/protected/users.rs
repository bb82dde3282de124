// handlers/protected/users.rs - account administration

use axum::extract::{rejection::JsonRejection, rejection::QueryRejection, Query};
use axum::{Extension, Json};
use serde_json::Value;
use uuid::Uuid;

use crate::database::models::User;
use crate::database::pagination::{Page, PageQuery};
use crate::handlers::ApiPath;
use crate::middleware::{ApiResponse, ApiResult, ValidatedUser};
use crate::services::user_service::{NewUser, UserFilter, UserUpdate};
use crate::services::UserService;

/// GET /api/users - List accounts (admin); filters `role`, `q`
pub async fn users_get(
    Extension(user): Extension<ValidatedUser>,
    page: Result<Query<PageQuery>, QueryRejection>,
    filter: Result<Query<UserFilter>, QueryRejection>,
) -> ApiResult<Page<User>> {
    let Query(page) = page?;
    let Query(filter) = filter?;
    let users = UserService::connect().await?;
    Ok(ApiResponse::success(users.list(&user.actor(), &filter, &page).await?))
}

/// POST /api/users - Create an account with any role (admin)
pub async fn users_post(
    Extension(user): Extension<ValidatedUser>,
    payload: Result<Json<NewUser>, JsonRejection>,
) -> ApiResult<User> {
    let Json(input) = payload?;
    let users = UserService::connect().await?;
    Ok(ApiResponse::created(users.create(&user.actor(), input).await?))
}

/// GET /api/users/:id - Admins see anyone, everyone else only themselves
pub async fn user_get(Extension(user): Extension<ValidatedUser>, ApiPath(id): ApiPath<Uuid>) -> ApiResult<User> {
    let users = UserService::connect().await?;
    Ok(ApiResponse::success(users.get(&user.actor(), id).await?))
}

/// PATCH /api/users/:id - Update profile, role or active flag (admin)
pub async fn user_patch(
    Extension(user): Extension<ValidatedUser>,
    ApiPath(id): ApiPath<Uuid>,
    payload: Result<Json<UserUpdate>, JsonRejection>,
) -> ApiResult<User> {
    let Json(update) = payload?;
    let users = UserService::connect().await?;
    Ok(ApiResponse::success(users.update(&user.actor(), id, update).await?))
}

/// DELETE /api/users/:id - Remove an account (admin, never yourself)
pub async fn user_delete(Extension(user): Extension<ValidatedUser>, ApiPath(id): ApiPath<Uuid>) -> ApiResult<Value> {
    let users = UserService::connect().await?;
    users.delete(&user.actor(), id).await?;
    Ok(ApiResponse::deleted(id))
}
