// handlers/public/auth/register.rs - POST /auth/register

use axum::{extract::rejection::JsonRejection, Json};
use serde::Deserialize;

use super::TokenResponse;
use crate::config;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::user_service::NewUser;
use crate::services::UserService;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub title: Option<String>,
}

/// POST /auth/register - Self-registration; always creates a buyer account
///
/// Disabled when `security.allow_registration` is off (403). A duplicate email
/// answers 409.
pub async fn register_post(payload: Result<Json<RegisterRequest>, JsonRejection>) -> ApiResult<TokenResponse> {
    if !config::config().security.allow_registration {
        return Err(ApiError::forbidden("Self-registration is disabled"));
    }
    let Json(request) = payload?;

    let users = UserService::connect().await?;
    let user = users
        .register(NewUser {
            email: request.email,
            password: request.password,
            name: request.name,
            role: None,
            company: request.company,
            phone: request.phone,
            title: request.title,
        })
        .await?;
    tracing::info!("Registered buyer account {}", user.email);

    Ok(ApiResponse::created(TokenResponse::issue(user)?))
}
