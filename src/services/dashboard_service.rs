use serde::Serialize;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::feedback_service::RatingSummary;
use super::storage_service::StorageSummary;
use super::{ServiceError, StorageService};
use crate::auth::permissions::{self, Actor};
use crate::database::manager::DatabaseManager;
use crate::types::{LeadStatus, Role};

#[derive(Debug, Clone, Default, Serialize)]
pub struct DemoCounts {
    pub total: i64,
    pub active: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LeadCounts {
    pub total: i64,
    pub by_status: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ShareLinkCounts {
    pub total: i64,
    pub active: i64,
    pub views: i64,
}

/// Role-scoped overview; sections a role cannot see are omitted
#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub role: Role,
    pub demos: DemoCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub products: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub users: Option<BTreeMap<String, i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leads: Option<LeadCounts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share_links: Option<ShareLinkCounts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<RatingSummary>,
    pub storage: StorageSummary,
}

pub struct DashboardService {
    pool: PgPool,
}

impl DashboardService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect() -> Result<Self, ServiceError> {
        Ok(Self::new(DatabaseManager::pool().await?))
    }

    pub async fn overview(&self, actor: &Actor) -> Result<Dashboard, ServiceError> {
        let storage = StorageService::new(self.pool.clone()).usage(actor, actor.id).await?;
        let demos = self.demo_counts(actor).await?;

        if !actor.role.is_staff() {
            return Ok(Dashboard {
                role: actor.role,
                demos,
                products: None,
                users: None,
                leads: None,
                share_links: None,
                feedback: None,
                storage,
            });
        }

        let products: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        let users = if permissions::can_manage_users(actor) {
            Some(self.user_counts().await?)
        } else {
            None
        };
        let owner = permissions::leads_scoped_to_owner(actor).then_some(actor.id);

        Ok(Dashboard {
            role: actor.role,
            demos,
            products: Some(products),
            users,
            leads: Some(self.lead_counts(owner).await?),
            share_links: Some(self.share_link_counts(owner).await?),
            feedback: Some(self.rating_summary(owner).await?),
            storage,
        })
    }

    async fn demo_counts(&self, actor: &Actor) -> Result<DemoCounts, ServiceError> {
        let (total, active): (i64, i64) = if actor.role == Role::Buyer {
            sqlx::query_as(
                "SELECT COUNT(*), COUNT(*) FILTER (WHERE d.status = 'active')
                 FROM demos d JOIN demo_assignments a ON a.demo_id = d.id
                 WHERE a.user_id = $1 AND d.status = 'active'",
            )
            .bind(actor.id)
            .fetch_one(&self.pool)
            .await?
        } else {
            sqlx::query_as("SELECT COUNT(*), COUNT(*) FILTER (WHERE status = 'active') FROM demos")
                .fetch_one(&self.pool)
                .await?
        };
        Ok(DemoCounts { total, active })
    }

    async fn user_counts(&self) -> Result<BTreeMap<String, i64>, ServiceError> {
        let rows: Vec<(String, i64)> = sqlx::query_as("SELECT role, COUNT(*) FROM users GROUP BY role")
            .fetch_all(&self.pool)
            .await?;
        let mut counts: BTreeMap<String, i64> = Role::ALL.iter().map(|r| (r.to_string(), 0)).collect();
        counts.extend(rows);
        Ok(counts)
    }

    async fn lead_counts(&self, owner: Option<Uuid>) -> Result<LeadCounts, ServiceError> {
        let mut query = QueryBuilder::<Postgres>::new("SELECT status, COUNT(*) FROM leads");
        if let Some(owner) = owner {
            query.push(" WHERE shared_by_user_id = ").push_bind(owner);
        }
        query.push(" GROUP BY status");
        let rows: Vec<(String, i64)> = query.build_query_as().fetch_all(&self.pool).await?;
        Ok(tally_leads(rows))
    }

    async fn share_link_counts(&self, owner: Option<Uuid>) -> Result<ShareLinkCounts, ServiceError> {
        let mut query = QueryBuilder::<Postgres>::new(
            "SELECT COUNT(*),
                    COUNT(*) FILTER (WHERE revoked_at IS NULL AND (expires_at IS NULL OR expires_at > now())),
                    COALESCE(SUM(view_count), 0)::BIGINT
             FROM share_links",
        );
        if let Some(owner) = owner {
            query.push(" WHERE created_by = ").push_bind(owner);
        }
        let (total, active, views): (i64, i64, i64) = query.build_query_as().fetch_one(&self.pool).await?;
        Ok(ShareLinkCounts { total, active, views })
    }

    async fn rating_summary(&self, owner: Option<Uuid>) -> Result<RatingSummary, ServiceError> {
        let mut query = QueryBuilder::<Postgres>::new(
            "SELECT COUNT(*) AS count,
                    ROUND(AVG(f.overall_rating)::numeric, 2)::float8 AS average_overall,
                    ROUND(AVG(f.ease_of_use_rating)::numeric, 2)::float8 AS average_ease_of_use,
                    ROUND(AVG(f.relevance_rating)::numeric, 2)::float8 AS average_relevance
             FROM feedback f JOIN leads l ON l.id = f.lead_id",
        );
        if let Some(owner) = owner {
            query.push(" WHERE l.shared_by_user_id = ").push_bind(owner);
        }
        Ok(query.build_query_as::<RatingSummary>().fetch_one(&self.pool).await?)
    }
}

/// Every status appears, even with a zero count
fn tally_leads(rows: Vec<(String, i64)>) -> LeadCounts {
    let mut by_status: BTreeMap<String, i64> = LeadStatus::ALL.iter().map(|s| (s.to_string(), 0)).collect();
    let mut total = 0;
    for (status, count) in rows {
        total += count;
        *by_status.entry(status).or_default() += count;
    }
    LeadCounts { total, by_status }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lead_tally_fills_missing_statuses() {
        let counts = tally_leads(vec![("new".into(), 3), ("closed".into(), 1)]);
        assert_eq!(counts.total, 4);
        assert_eq!(counts.by_status["new"], 3);
        assert_eq!(counts.by_status["contacted"], 0);
        assert_eq!(counts.by_status["qualified"], 0);
        assert_eq!(counts.by_status["closed"], 1);
    }
}
