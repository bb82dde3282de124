use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use super::demo_service::fetch_demo;
use super::product_service::PRODUCT_COLUMNS;
use super::share_token::{generate_token, hash_token, looks_like_token};
use super::{ensure, MediaService, ServiceError};
use crate::auth::permissions::{self, Actor};
use crate::config;
use crate::database::manager::DatabaseManager;
use crate::database::models::{Demo, DemoMedia, Product, ShareLink};
use crate::validation::ValidationErrors;

const LINK_COLUMNS: &str =
    "id, demo_id, created_by, token_hash, include_credentials, expires_at, revoked_at, view_count, created_at";

/// Longest lifetime `expires_in_hours` may ask for (one year)
const MAX_LINK_HOURS: i64 = 24 * 365;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShareLinkInput {
    #[serde(default)]
    pub include_credentials: bool,
    pub expires_at: Option<DateTime<Utc>>,
    /// Convenience alternative to `expires_at`
    pub expires_in_hours: Option<i64>,
}

impl ShareLinkInput {
    fn expiry(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, ValidationErrors> {
        let expires_at = match (self.expires_at, self.expires_in_hours) {
            (Some(_), Some(_)) => {
                return Err(ValidationErrors::single("expires_at", "Give either expires_at or expires_in_hours"))
            }
            (Some(at), None) => Some(at),
            (None, Some(hours)) if hours <= 0 => {
                return Err(ValidationErrors::single("expires_in_hours", "Must be greater than zero"))
            }
            (None, Some(hours)) => {
                let at = Some(hours)
                    .filter(|h| *h <= MAX_LINK_HOURS)
                    .and_then(Duration::try_hours)
                    .and_then(|d| now.checked_add_signed(d))
                    .ok_or_else(|| {
                        ValidationErrors::single(
                            "expires_in_hours",
                            format!("Must be at most {} (one year)", MAX_LINK_HOURS),
                        )
                    })?;
                Some(at)
            }
            (None, None) => None,
        };
        match expires_at {
            Some(at) if at <= now => Err(ValidationErrors::single("expires_at", "Must be in the future")),
            other => Ok(other),
        }
    }
}

/// Returned once at creation; the raw token is never stored
#[derive(Debug, Clone, Serialize)]
pub struct CreatedShareLink {
    #[serde(flatten)]
    pub link: ShareLink,
    pub token: String,
    pub url: String,
}

/// What a prospect sees when opening a share link
#[derive(Debug, Clone, Serialize)]
pub struct SharedDemo {
    pub demo: Demo,
    pub product: Product,
    pub media: Vec<DemoMedia>,
    pub expires_at: Option<DateTime<Utc>>,
}

pub struct ShareLinkService {
    pool: PgPool,
}

impl ShareLinkService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect() -> Result<Self, ServiceError> {
        Ok(Self::new(DatabaseManager::pool().await?))
    }

    pub async fn create(&self, actor: &Actor, demo_id: Uuid, input: ShareLinkInput) -> Result<CreatedShareLink, ServiceError> {
        ensure(permissions::can_create_share_link(actor), "share demos")?;
        let demo = fetch_demo(&self.pool, demo_id).await?;
        if !demo.is_active() {
            return Err(ServiceError::Conflict("Inactive demos cannot be shared".to_string()));
        }
        let expires_at = input.expiry(Utc::now())?;

        let token = generate_token();
        let sql = format!(
            "INSERT INTO share_links (id, demo_id, created_by, token_hash, include_credentials, expires_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {}",
            LINK_COLUMNS
        );
        let link = sqlx::query_as::<_, ShareLink>(&sql)
            .bind(Uuid::new_v4())
            .bind(demo_id)
            .bind(actor.id)
            .bind(hash_token(&token))
            .bind(input.include_credentials)
            .bind(expires_at)
            .fetch_one(&self.pool)
            .await?;

        info!(
            "User {} created share link {} for demo {} (credentials: {})",
            actor.id, link.id, demo_id, link.include_credentials
        );
        let url = config::config().share_url(&token);
        Ok(CreatedShareLink { link, token, url })
    }

    /// Admins see every link of the demo; salespeople only their own
    pub async fn list(&self, actor: &Actor, demo_id: Uuid) -> Result<Vec<ShareLink>, ServiceError> {
        ensure(permissions::can_create_share_link(actor), "view share links")?;
        fetch_demo(&self.pool, demo_id).await?;

        let links = if permissions::share_links_scoped_to_creator(actor) {
            let sql = format!(
                "SELECT {} FROM share_links WHERE demo_id = $1 AND created_by = $2 ORDER BY created_at DESC",
                LINK_COLUMNS
            );
            sqlx::query_as::<_, ShareLink>(&sql)
                .bind(demo_id)
                .bind(actor.id)
                .fetch_all(&self.pool)
                .await?
        } else {
            let sql = format!("SELECT {} FROM share_links WHERE demo_id = $1 ORDER BY created_at DESC", LINK_COLUMNS);
            sqlx::query_as::<_, ShareLink>(&sql).bind(demo_id).fetch_all(&self.pool).await?
        };
        Ok(links)
    }

    /// Revoking an already revoked link keeps the original revocation time
    pub async fn revoke(&self, actor: &Actor, id: Uuid) -> Result<ShareLink, ServiceError> {
        let sql = format!("SELECT {} FROM share_links WHERE id = $1", LINK_COLUMNS);
        let link = sqlx::query_as::<_, ShareLink>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("Share link"))?;
        ensure(permissions::can_revoke_share_link(actor, link.created_by), "revoke this share link")?;

        let sql = format!(
            "UPDATE share_links SET revoked_at = COALESCE(revoked_at, now()) WHERE id = $1 RETURNING {}",
            LINK_COLUMNS
        );
        let revoked = sqlx::query_as::<_, ShareLink>(&sql).bind(id).fetch_one(&self.pool).await?;
        info!("User {} revoked share link {}", actor.id, id);
        Ok(revoked)
    }

    /// Look up a usable link and its active demo. Anything else is a plain 404.
    pub async fn resolve(&self, token: &str) -> Result<(ShareLink, Demo), ServiceError> {
        let missing = || ServiceError::not_found("Shared demo");
        if !looks_like_token(token) {
            return Err(missing());
        }

        let sql = format!("SELECT {} FROM share_links WHERE token_hash = $1", LINK_COLUMNS);
        let link = sqlx::query_as::<_, ShareLink>(&sql)
            .bind(hash_token(token))
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(missing)?;
        if !link.is_usable_at(Utc::now()) {
            debug!("Share link {} is revoked or expired", link.id);
            return Err(missing());
        }

        let demo = fetch_demo(&self.pool, link.demo_id).await.map_err(|_| missing())?;
        if !demo.is_active() {
            return Err(missing());
        }
        Ok((link, demo))
    }

    /// Open a share link: counts the view and returns the prospect's view of the demo
    pub async fn open(&self, token: &str) -> Result<SharedDemo, ServiceError> {
        let (link, demo) = self.resolve(token).await?;

        sqlx::query("UPDATE share_links SET view_count = view_count + 1 WHERE id = $1")
            .bind(link.id)
            .execute(&self.pool)
            .await?;

        let sql = format!("SELECT {} FROM products WHERE id = $1", PRODUCT_COLUMNS);
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(demo.product_id)
            .fetch_one(&self.pool)
            .await?;
        let media = MediaService::media_for_demo(&self.pool, demo.id).await?;

        let demo = if link.include_credentials { demo } else { demo.redacted() };
        Ok(SharedDemo {
            demo,
            product,
            media,
            expires_at: link.expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_defaults_to_open_ended() {
        let input = ShareLinkInput::default();
        assert_eq!(input.expiry(Utc::now()).unwrap(), None);
    }

    #[test]
    fn expiry_from_hours() {
        let now = Utc::now();
        let input = ShareLinkInput {
            expires_in_hours: Some(48),
            ..Default::default()
        };
        assert_eq!(input.expiry(now).unwrap(), Some(now + Duration::hours(48)));
    }

    #[test]
    fn past_or_conflicting_expiry_is_rejected() {
        let now = Utc::now();
        let past = ShareLinkInput {
            expires_at: Some(now - Duration::minutes(5)),
            ..Default::default()
        };
        assert!(past.expiry(now).unwrap_err().fields.contains_key("expires_at"));

        let both = ShareLinkInput {
            expires_at: Some(now + Duration::hours(1)),
            expires_in_hours: Some(1),
            ..Default::default()
        };
        assert!(both.expiry(now).is_err());

        let zero = ShareLinkInput {
            expires_in_hours: Some(0),
            ..Default::default()
        };
        assert!(zero.expiry(now).unwrap_err().fields.contains_key("expires_in_hours"));
    }

    #[test]
    fn oversized_hours_are_a_validation_error() {
        let now = Utc::now();
        for hours in [MAX_LINK_HOURS + 1, 10_000_000_000, i64::MAX] {
            let input = ShareLinkInput {
                expires_in_hours: Some(hours),
                ..Default::default()
            };
            let err = input.expiry(now).unwrap_err();
            assert!(err.fields.contains_key("expires_in_hours"), "{}", hours);
        }

        let year = ShareLinkInput {
            expires_in_hours: Some(MAX_LINK_HOURS),
            ..Default::default()
        };
        assert_eq!(year.expiry(now).unwrap(), Some(now + Duration::hours(MAX_LINK_HOURS)));
    }
}
