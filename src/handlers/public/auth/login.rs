// handlers/public/auth/login.rs - POST /auth/login

use axum::{extract::rejection::JsonRejection, Json};
use serde::Deserialize;

use super::TokenResponse;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::UserService;
use crate::validation::{normalize_email, Validator};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// POST /auth/login - Authenticate with email and password and receive a JWT
///
/// Expected Output:
/// ```json
/// {
///   "success": true,
///   "data": {
///     "token": "eyJhbGciOiJIUzI1NiI...",
///     "user": { "id": "...", "email": "rep@example.com", "role": "sales", ... },
///     "expires_in": 86400
///   }
/// }
/// ```
///
/// Unknown email, wrong password and a deactivated account all answer with the
/// same 401.
pub async fn login_post(payload: Result<Json<LoginRequest>, JsonRejection>) -> ApiResult<TokenResponse> {
    let Json(request) = payload?;

    // shape checks first so malformed requests never reach the database
    Validator::new()
        .email("email", &normalize_email(&request.email))
        .required("password", &request.password)
        .finish()?;

    let users = UserService::connect().await?;
    let user = users.authenticate(&request.email, &request.password).await?;

    Ok(ApiResponse::success(TokenResponse::issue(user)?))
}
