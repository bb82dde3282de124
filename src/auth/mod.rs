pub mod permissions;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config;
use crate::database::models::User;
use crate::types::Role;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(user_id: Uuid, email: String, role: Role) -> Self {
        let expiry_hours = config::config().security.jwt_expiry_hours;
        Self::with_lifetime(user_id, email, role, Duration::hours(expiry_hours as i64))
    }

    pub fn for_user(user: &User) -> Self {
        Self::new(user.id, user.email.clone(), user.role)
    }

    fn with_lifetime(user_id: Uuid, email: String, role: Role, lifetime: Duration) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id,
            email,
            role,
            exp: (now + lifetime).timestamp(),
            iat: now.timestamp(),
        }
    }

    /// Seconds until the token expires (zero once expired)
    pub fn expires_in(&self) -> i64 {
        (self.exp - Utc::now().timestamp()).max(0)
    }
}

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("JWT generation error: {0}")]
    TokenGeneration(String),
    #[error("Invalid JWT secret")]
    InvalidSecret,
    #[error("Invalid JWT token: {0}")]
    InvalidToken(String),
    #[error("Token is too old to refresh")]
    RefreshWindowExpired,
}

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("Password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
}

pub fn generate_jwt(claims: &Claims) -> Result<String, JwtError> {
    encode_with_secret(claims, &config::config().security.jwt_secret)
}

/// Validate a token's signature and expiry
pub fn validate_jwt(token: &str) -> Result<Claims, JwtError> {
    decode_with_secret(token, &config::config().security.jwt_secret, true)
}

/// Validate a token for refresh: the signature must hold, and an expired token is
/// accepted while it is still inside the refresh window
pub fn validate_jwt_for_refresh(token: &str) -> Result<Claims, JwtError> {
    let security = &config::config().security;
    let claims = decode_with_secret(token, &security.jwt_secret, false)?;
    check_refresh_window(&claims, security.refresh_window_hours)?;
    Ok(claims)
}

fn check_refresh_window(claims: &Claims, window_hours: u64) -> Result<(), JwtError> {
    let deadline = claims.exp + Duration::hours(window_hours as i64).num_seconds();
    if Utc::now().timestamp() > deadline {
        return Err(JwtError::RefreshWindowExpired);
    }
    Ok(())
}

fn encode_with_secret(claims: &Claims, secret: &str) -> Result<String, JwtError> {
    if secret.is_empty() {
        return Err(JwtError::InvalidSecret);
    }

    let encoding_key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::default(), claims, &encoding_key).map_err(|e| JwtError::TokenGeneration(e.to_string()))
}

fn decode_with_secret(token: &str, secret: &str, validate_exp: bool) -> Result<Claims, JwtError> {
    if secret.is_empty() {
        return Err(JwtError::InvalidSecret);
    }

    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::default();
    validation.validate_exp = validate_exp;
    if !validate_exp {
        validation.required_spec_claims.remove("exp");
    }

    decode::<Claims>(token, &decoding_key, &validation)
        .map(|data| data.claims)
        .map_err(|e| JwtError::InvalidToken(e.to_string()))
}

pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    Ok(bcrypt::hash(password, config::config().security.bcrypt_cost)?)
}

/// A malformed stored hash counts as a mismatch
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// Hash at the configured cost, compared against when the account does not exist
static DUMMY_HASH: once_cell::sync::Lazy<Option<String>> =
    once_cell::sync::Lazy::new(|| hash_password("no-such-account").ok());

/// Spend the same bcrypt work as a real check; never matches
pub fn verify_missing_account(password: &str) -> bool {
    if let Some(hash) = DUMMY_HASH.as_deref() {
        let _ = verify_password(password, hash);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_account_check_does_real_work_and_fails() {
        assert!(DUMMY_HASH.is_some());
        assert!(!verify_missing_account("no-such-account"));
        assert!(!verify_missing_account("anything"));
    }

    const SECRET: &str = "test-secret";

    #[test]
    fn token_round_trip_keeps_claims() {
        let id = Uuid::new_v4();
        let claims = Claims::with_lifetime(id, "a@b.co".into(), Role::Sales, Duration::hours(1));
        let token = encode_with_secret(&claims, SECRET).unwrap();

        let decoded = decode_with_secret(&token, SECRET, true).unwrap();
        assert_eq!(decoded.sub, id);
        assert_eq!(decoded.role, Role::Sales);
        assert_eq!(decoded.email, "a@b.co");
    }

    #[test]
    fn rejects_wrong_secret_and_empty_secret() {
        let claims = Claims::with_lifetime(Uuid::new_v4(), "a@b.co".into(), Role::Admin, Duration::hours(1));
        let token = encode_with_secret(&claims, SECRET).unwrap();

        assert!(matches!(decode_with_secret(&token, "other", true), Err(JwtError::InvalidToken(_))));
        assert!(matches!(encode_with_secret(&claims, ""), Err(JwtError::InvalidSecret)));
    }

    #[test]
    fn expired_token_fails_normal_validation_but_decodes_for_refresh() {
        let claims = Claims::with_lifetime(Uuid::new_v4(), "a@b.co".into(), Role::Buyer, Duration::hours(-2));
        let token = encode_with_secret(&claims, SECRET).unwrap();

        assert!(decode_with_secret(&token, SECRET, true).is_err());
        let decoded = decode_with_secret(&token, SECRET, false).unwrap();
        assert!(check_refresh_window(&decoded, 24).is_ok());
        assert!(matches!(check_refresh_window(&decoded, 1), Err(JwtError::RefreshWindowExpired)));
        assert_eq!(decoded.expires_in(), 0);
    }

    #[test]
    fn password_hash_verifies() {
        let hash = bcrypt::hash("correct horse", 4).unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("battery staple", &hash));
        assert!(!verify_password("anything", "not-a-bcrypt-hash"));
    }
}
