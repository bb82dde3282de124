use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// A lead's rating of a demo
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Feedback {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub demo_id: Uuid,
    pub overall_rating: i16,
    pub ease_of_use_rating: Option<i16>,
    pub relevance_rating: Option<i16>,
    pub comments: Option<String>,
    pub created_at: DateTime<Utc>,
}
