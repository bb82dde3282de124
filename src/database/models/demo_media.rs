use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use crate::types::MediaType;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DemoMedia {
    pub id: Uuid,
    pub demo_id: Uuid,
    #[sqlx(try_from = "String")]
    pub media_type: MediaType,
    pub url: String,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    /// Zero for linked (externally hosted) media
    pub size_bytes: i64,
    pub metadata: Value,
    pub uploaded_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl DemoMedia {
    /// Stored file name under the upload directory, if the media was uploaded here
    pub fn stored_key(&self) -> Option<&str> {
        self.metadata.get("storage_key").and_then(Value::as_str)
    }
}
