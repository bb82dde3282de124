use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Fresh unguessable share token (two v4 uuids, 64 hex chars)
pub fn generate_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

/// Only this digest is persisted; the raw token is shown once at creation
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.trim().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Cheap shape check before hitting the database
pub fn looks_like_token(token: &str) -> bool {
    token.len() == 64 && token.chars().all(|c| c.is_ascii_hexdigit())
}
