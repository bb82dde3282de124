// handlers/public/auth/refresh.rs - POST /auth/refresh

use axum::{extract::rejection::JsonRejection, Json};
use serde::Deserialize;

use super::TokenResponse;
use crate::auth::validate_jwt_for_refresh;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::UserService;

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub token: String,
}

/// POST /auth/refresh - Exchange a (possibly expired) token for a fresh one
///
/// The signature must be valid, the token must still be inside the refresh
/// window, and the account must still be active with the same role.
pub async fn refresh_post(payload: Result<Json<RefreshRequest>, JsonRejection>) -> ApiResult<TokenResponse> {
    let Json(request) = payload?;
    let claims = validate_jwt_for_refresh(request.token.trim()).map_err(|e| {
        tracing::warn!("Refresh rejected: {}", e);
        ApiError::unauthorized("Token cannot be refreshed")
    })?;

    let users = UserService::connect().await?;
    let user = users
        .find_by_id(claims.sub)
        .await?
        .filter(|user| user.is_active && user.role == claims.role)
        .ok_or_else(|| {
            tracing::warn!("Refresh rejected: account {} is gone, inactive or changed role", claims.sub);
            ApiError::unauthorized("Token cannot be refreshed")
        })?;

    Ok(ApiResponse::success(TokenResponse::issue(user)?))
}
