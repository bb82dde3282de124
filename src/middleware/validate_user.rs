use axum::{extract::Request, middleware::Next, response::Response};

use super::auth::AuthUser;
use crate::auth::permissions::Actor;
use crate::database::models::User;
use crate::error::ApiError;
use crate::services::UserService;

/// The caller's current account row, re-read on every protected request
#[derive(Clone, Debug)]
pub struct ValidatedUser(pub User);

impl ValidatedUser {
    pub fn actor(&self) -> Actor {
        Actor::new(self.0.id, self.0.role)
    }
}

/// Middleware that checks the token's user still exists, is active, and still
/// has the role the token was issued for
pub async fn validate_user_middleware(mut request: Request, next: Next) -> Result<Response, ApiError> {
    let auth_user = request
        .extensions()
        .get::<AuthUser>()
        .cloned()
        .ok_or_else(|| ApiError::unauthorized("JWT authentication required before user validation"))?;

    let users = UserService::connect().await?;
    let user = users.find_by_id(auth_user.user_id).await?.ok_or_else(|| {
        tracing::warn!("User validation failed: {} ({}) no longer exists", auth_user.email, auth_user.user_id);
        ApiError::unauthorized("User no longer exists")
    })?;

    if !user.is_active {
        tracing::warn!("User validation failed: {} is deactivated", user.email);
        return Err(ApiError::unauthorized("User account is deactivated"));
    }

    // A role change invalidates outstanding tokens
    if user.role != auth_user.role {
        tracing::warn!(
            "User validation failed: token role '{}' doesn't match current role '{}' for {}",
            auth_user.role,
            user.role,
            user.email
        );
        return Err(ApiError::unauthorized("Role has changed, please log in again"));
    }

    tracing::debug!("User validation successful: {} ({})", user.email, user.role);
    request.extensions_mut().insert(ValidatedUser(user));

    Ok(next.run(request).await)
}
