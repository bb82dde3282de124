use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use crate::types::DemoStatus;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Demo {
    pub id: Uuid,
    pub product_id: Uuid,
    pub title: String,
    pub content: Option<String>,
    pub instructions: Option<String>,
    pub credentials: Option<Value>,
    #[sqlx(try_from = "String")]
    pub status: DemoStatus,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Demo {
    pub fn is_active(&self) -> bool {
        self.status == DemoStatus::Active
    }

    /// Drop the credentials blob before the demo leaves the server
    pub fn redacted(mut self) -> Self {
        self.credentials = None;
        self
    }
}
