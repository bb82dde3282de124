// handlers/protected/auth.rs - the caller's own account

use axum::{extract::rejection::JsonRejection, Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::database::models::User;
use crate::middleware::{ApiResponse, ApiResult, ValidatedUser};
use crate::services::user_service::ProfileUpdate;
use crate::services::UserService;

#[derive(Debug, Deserialize)]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
}

/// GET /api/auth/whoami - Current user as stored right now
pub async fn whoami_get(Extension(user): Extension<ValidatedUser>) -> ApiResult<User> {
    Ok(ApiResponse::success(user.0))
}

/// PUT /api/auth/profile - Update name and contact details (not role or status)
pub async fn profile_put(
    Extension(user): Extension<ValidatedUser>,
    payload: Result<Json<ProfileUpdate>, JsonRejection>,
) -> ApiResult<User> {
    let Json(update) = payload?;
    let users = UserService::connect().await?;
    Ok(ApiResponse::success(users.update_profile(&user.actor(), update).await?))
}

/// PUT /api/auth/password - Change password; the current one must be supplied
pub async fn password_put(
    Extension(user): Extension<ValidatedUser>,
    payload: Result<Json<PasswordChange>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(change) = payload?;
    let users = UserService::connect().await?;
    users
        .change_password(&user.actor(), &change.current_password, &change.new_password)
        .await?;
    Ok(ApiResponse::success(json!({ "changed": true })))
}
