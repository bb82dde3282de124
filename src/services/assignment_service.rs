use serde::Deserialize;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use super::demo_service::fetch_demo;
use super::{ensure, ServiceError};
use crate::auth::permissions::{self, Actor};
use crate::database::manager::DatabaseManager;
use crate::database::models::DemoAssignment;
use crate::validation::ValidationErrors;

const ASSIGNMENT_SELECT: &str = "SELECT a.demo_id, a.user_id, a.assigned_by, a.created_at,
        u.email AS user_email, u.name AS user_name
     FROM demo_assignments a
     JOIN users u ON u.id = a.user_id";

#[derive(Debug, Clone, Deserialize)]
pub struct AssignmentInput {
    pub user_id: Uuid,
}

pub struct AssignmentService {
    pool: PgPool,
}

impl AssignmentService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect() -> Result<Self, ServiceError> {
        Ok(Self::new(DatabaseManager::pool().await?))
    }

    pub async fn list(&self, actor: &Actor, demo_id: Uuid) -> Result<Vec<DemoAssignment>, ServiceError> {
        ensure(permissions::can_manage_demos(actor), "view demo assignments")?;
        fetch_demo(&self.pool, demo_id).await?;

        let sql = format!("{} WHERE a.demo_id = $1 ORDER BY a.created_at", ASSIGNMENT_SELECT);
        Ok(sqlx::query_as::<_, DemoAssignment>(&sql)
            .bind(demo_id)
            .fetch_all(&self.pool)
            .await?)
    }

    /// Assigning twice is a no-op that returns the existing assignment
    pub async fn assign(&self, actor: &Actor, demo_id: Uuid, user_id: Uuid) -> Result<DemoAssignment, ServiceError> {
        ensure(permissions::can_manage_demos(actor), "assign demos")?;
        fetch_demo(&self.pool, demo_id).await?;

        let user_exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        if !user_exists {
            return Err(ValidationErrors::single("user_id", "User does not exist").into());
        }

        let inserted = sqlx::query(
            "INSERT INTO demo_assignments (demo_id, user_id, assigned_by)
             VALUES ($1, $2, $3)
             ON CONFLICT (demo_id, user_id) DO NOTHING",
        )
        .bind(demo_id)
        .bind(user_id)
        .bind(actor.id)
        .execute(&self.pool)
        .await?;
        if inserted.rows_affected() > 0 {
            info!("User {} assigned demo {} to {}", actor.id, demo_id, user_id);
        }

        let sql = format!("{} WHERE a.demo_id = $1 AND a.user_id = $2", ASSIGNMENT_SELECT);
        Ok(sqlx::query_as::<_, DemoAssignment>(&sql)
            .bind(demo_id)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn unassign(&self, actor: &Actor, demo_id: Uuid, user_id: Uuid) -> Result<(), ServiceError> {
        ensure(permissions::can_manage_demos(actor), "unassign demos")?;
        let result = sqlx::query("DELETE FROM demo_assignments WHERE demo_id = $1 AND user_id = $2")
            .bind(demo_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found("Assignment"));
        }
        info!("User {} unassigned demo {} from {}", actor.id, demo_id, user_id);
        Ok(())
    }
}
