use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DemoAssignment {
    pub demo_id: Uuid,
    pub user_id: Uuid,
    pub assigned_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    // joined from users
    pub user_email: String,
    pub user_name: String,
}
