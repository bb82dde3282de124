use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use crate::services::quota::StorageQuota;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct StorageUsage {
    pub user_id: Uuid,
    pub total_bytes: i64,
    pub limit_bytes: i64,
    pub updated_at: DateTime<Utc>,
}

impl StorageUsage {
    pub fn quota(&self) -> StorageQuota {
        StorageQuota::new(self.total_bytes, self.limit_bytes)
    }
}
