use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use tracing::info;
use uuid::Uuid;

use super::{ensure, ServiceError};
use crate::auth::permissions::{self, Actor};
use crate::config;
use crate::database::manager::DatabaseManager;
use crate::database::models::StorageUsage;
use crate::validation::ValidationErrors;

const USAGE_COLUMNS: &str = "user_id, total_bytes, limit_bytes, updated_at";

/// Usage as reported to clients
#[derive(Debug, Clone, Serialize)]
pub struct StorageSummary {
    pub user_id: Uuid,
    pub total_bytes: i64,
    pub limit_bytes: i64,
    pub remaining_bytes: i64,
    pub percent_used: f64,
    pub media_count: i64,
}

impl StorageSummary {
    fn from_usage(usage: &StorageUsage, media_count: i64) -> Self {
        let quota = usage.quota();
        Self {
            user_id: usage.user_id,
            total_bytes: quota.total_bytes,
            limit_bytes: quota.limit_bytes,
            remaining_bytes: quota.remaining(),
            percent_used: quota.percent_used(),
            media_count,
        }
    }
}

pub struct StorageService {
    pool: PgPool,
}

impl StorageService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect() -> Result<Self, ServiceError> {
        Ok(Self::new(DatabaseManager::pool().await?))
    }

    /// Create the usage row on first touch, then lock it for the rest of the transaction
    pub async fn lock_usage(conn: &mut PgConnection, user_id: Uuid) -> Result<StorageUsage, ServiceError> {
        sqlx::query(
            "INSERT INTO storage_usage (user_id, total_bytes, limit_bytes)
             VALUES ($1, 0, $2)
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(config::config().storage.default_limit_bytes)
        .execute(&mut *conn)
        .await?;

        let sql = format!("SELECT {} FROM storage_usage WHERE user_id = $1 FOR UPDATE", USAGE_COLUMNS);
        Ok(sqlx::query_as::<_, StorageUsage>(&sql)
            .bind(user_id)
            .fetch_one(&mut *conn)
            .await?)
    }

    pub async fn store_total(conn: &mut PgConnection, user_id: Uuid, total_bytes: i64) -> Result<(), ServiceError> {
        sqlx::query("UPDATE storage_usage SET total_bytes = $2, updated_at = now() WHERE user_id = $1")
            .bind(user_id)
            .bind(total_bytes)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Give bytes back to a user's quota, never dropping below zero
    pub async fn release(conn: &mut PgConnection, user_id: Uuid, bytes: i64) -> Result<(), ServiceError> {
        if bytes <= 0 {
            return Ok(());
        }
        let usage = Self::lock_usage(conn, user_id).await?;
        let released = usage.quota().with_release(bytes);
        Self::store_total(conn, user_id, released.total_bytes).await
    }

    /// Usage without a permission check (CLI)
    pub async fn usage_for(&self, user_id: Uuid) -> Result<StorageSummary, ServiceError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        if !exists {
            return Err(ServiceError::not_found("User"));
        }

        let mut tx = self.pool.begin().await?;
        let usage = Self::lock_usage(&mut tx, user_id).await?;
        tx.commit().await?;

        let media_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM demo_media WHERE uploaded_by = $1 AND size_bytes > 0")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(StorageSummary::from_usage(&usage, media_count))
    }

    pub async fn usage(&self, actor: &Actor, user_id: Uuid) -> Result<StorageSummary, ServiceError> {
        ensure(permissions::can_view_storage(actor, user_id), "view this user's storage")?;
        self.usage_for(user_id).await
    }

    /// Lowering a limit below current usage is allowed; it only blocks further uploads
    pub async fn set_limit(&self, actor: &Actor, user_id: Uuid, limit_bytes: i64) -> Result<StorageSummary, ServiceError> {
        ensure(permissions::can_set_storage_limit(actor), "change storage limits")?;
        let summary = self.apply_limit(user_id, limit_bytes).await?;
        info!("User {} set storage limit of {} to {} bytes", actor.id, user_id, limit_bytes);
        Ok(summary)
    }

    /// Limit change without a permission check (CLI)
    pub async fn apply_limit(&self, user_id: Uuid, limit_bytes: i64) -> Result<StorageSummary, ServiceError> {
        if limit_bytes <= 0 {
            return Err(ValidationErrors::single("limit_bytes", "Must be greater than zero").into());
        }
        // make sure the row exists before updating it
        self.usage_for(user_id).await?;

        sqlx::query("UPDATE storage_usage SET limit_bytes = $2, updated_at = now() WHERE user_id = $1")
            .bind(user_id)
            .bind(limit_bytes)
            .execute(&self.pool)
            .await?;

        self.usage_for(user_id).await
    }

    /// Recompute a user's total from the media rows they uploaded (CLI repair)
    pub async fn recalculate(&self, user_id: Uuid) -> Result<StorageSummary, ServiceError> {
        let mut tx = self.pool.begin().await?;
        Self::lock_usage(&mut tx, user_id).await?;
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(size_bytes), 0)::BIGINT FROM demo_media WHERE uploaded_by = $1",
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;
        Self::store_total(&mut tx, user_id, total).await?;
        tx.commit().await?;

        info!("Recalculated storage usage for {}: {} bytes", user_id, total);
        self.usage_for(user_id).await
    }
}
