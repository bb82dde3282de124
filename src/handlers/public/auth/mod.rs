// handlers/public/auth/mod.rs - token acquisition (no authentication)

use serde::Serialize;

use crate::auth::{generate_jwt, Claims};
use crate::database::models::User;
use crate::error::ApiError;

pub mod login; // POST /auth/login
pub mod refresh; // POST /auth/refresh
pub mod register; // POST /auth/register

pub use login::login_post;
pub use refresh::refresh_post;
pub use register::register_post;

/// Body returned by every endpoint that hands out a token
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub user: User,
    pub expires_in: i64,
}

impl TokenResponse {
    pub fn issue(user: User) -> Result<Self, ApiError> {
        let claims = Claims::for_user(&user);
        let token = generate_jwt(&claims)?;
        Ok(Self {
            token,
            expires_in: claims.expires_in(),
            user,
        })
    }
}
