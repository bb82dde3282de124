use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ShareLink {
    pub id: Uuid,
    pub demo_id: Uuid,
    pub created_by: Uuid,
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub include_credentials: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub view_count: i64,
    pub created_at: DateTime<Utc>,
}

impl ShareLink {
    /// A link is usable until it is revoked or its expiry passes
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        if self.revoked_at.is_some() {
            return false;
        }
        match self.expires_at {
            Some(expires_at) => expires_at > now,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn link() -> ShareLink {
        ShareLink {
            id: Uuid::new_v4(),
            demo_id: Uuid::new_v4(),
            created_by: Uuid::new_v4(),
            token_hash: String::new(),
            include_credentials: false,
            expires_at: None,
            revoked_at: None,
            view_count: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn open_ended_link_is_usable() {
        assert!(link().is_usable_at(Utc::now()));
    }

    #[test]
    fn expired_or_revoked_link_is_not_usable() {
        let now = Utc::now();

        let mut expired = link();
        expired.expires_at = Some(now - Duration::minutes(1));
        assert!(!expired.is_usable_at(now));

        let mut revoked = link();
        revoked.expires_at = Some(now + Duration::days(1));
        revoked.revoked_at = Some(now);
        assert!(!revoked.is_usable_at(now));
    }
}
