use serde::Deserialize;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::info;
use uuid::Uuid;

use super::{conflict_on_unique, ensure, invalid_reference, ServiceError};
use crate::auth::permissions::{self, Actor};
use crate::database::manager::DatabaseManager;
use crate::database::models::{Demo, Lead, ShareLink};
use crate::database::pagination::{Page, PageQuery, SortDirection, SortSpec};
use crate::types::LeadStatus;
use crate::validation::{clean_optional, contains_pattern, normalize_email, patch_optional, ValidationErrors, Validator};

const LEAD_SORT: SortSpec = SortSpec {
    fields: &[
        ("created_at", "created_at"),
        ("updated_at", "updated_at"),
        ("name", "name"),
        ("email", "email"),
        ("company", "company"),
        ("status", "status"),
    ],
    default_column: "created_at",
    default_direction: SortDirection::Desc,
};

pub(crate) const LEAD_COLUMNS: &str =
    "id, name, email, company, phone, job_title, notes, status, demo_id, shared_by_user_id, created_at, updated_at";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeadInput {
    pub name: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub job_title: Option<String>,
    pub notes: Option<String>,
    pub status: Option<LeadStatus>,
    pub demo_id: Option<Uuid>,
}

/// Contact details a prospect submits through a share link
#[derive(Debug, Clone, Deserialize)]
pub struct ProspectInput {
    pub name: String,
    pub email: String,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub job_title: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeadFilter {
    pub status: Option<LeadStatus>,
    pub demo_id: Option<Uuid>,
    pub q: Option<String>,
}

/// Load a lead or fail with 404
pub(crate) async fn fetch_lead(pool: &PgPool, id: Uuid) -> Result<Lead, ServiceError> {
    let sql = format!("SELECT {} FROM leads WHERE id = $1", LEAD_COLUMNS);
    sqlx::query_as::<_, Lead>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("Lead"))
}

/// Load a lead the actor may work with
pub(crate) async fn accessible_lead(pool: &PgPool, actor: &Actor, id: Uuid) -> Result<Lead, ServiceError> {
    let lead = fetch_lead(pool, id).await?;
    ensure(permissions::can_access_lead(actor, lead.shared_by_user_id), "access this lead")?;
    Ok(lead)
}

pub struct LeadService {
    pool: PgPool,
}

impl LeadService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect() -> Result<Self, ServiceError> {
        Ok(Self::new(DatabaseManager::pool().await?))
    }

    pub async fn list(&self, actor: &Actor, filter: &LeadFilter, page: &PageQuery) -> Result<Page<Lead>, ServiceError> {
        ensure(permissions::can_create_leads(actor), "view leads")?;
        let pagination = page.resolve(&LEAD_SORT)?;
        let scoped = permissions::leads_scoped_to_owner(actor);

        let push_filters = |builder: &mut QueryBuilder<'_, Postgres>| {
            builder.push(" WHERE 1=1");
            if scoped {
                builder.push(" AND shared_by_user_id = ").push_bind(actor.id);
            }
            if let Some(status) = filter.status {
                builder.push(" AND status = ").push_bind(status.as_str());
            }
            if let Some(demo_id) = filter.demo_id {
                builder.push(" AND demo_id = ").push_bind(demo_id);
            }
            if let Some(q) = filter.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
                let pattern = contains_pattern(q);
                builder.push(" AND (name ILIKE ").push_bind(pattern.clone());
                builder.push(" OR email ILIKE ").push_bind(pattern.clone());
                builder.push(" OR company ILIKE ").push_bind(pattern);
                builder.push(")");
            }
        };

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM leads");
        push_filters(&mut count);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM leads", LEAD_COLUMNS));
        push_filters(&mut select);
        pagination.push_to(&mut select);
        let leads = select.build_query_as::<Lead>().fetch_all(&self.pool).await?;

        Ok(Page::new(leads, total, &pagination))
    }

    pub async fn get(&self, actor: &Actor, id: Uuid) -> Result<Lead, ServiceError> {
        accessible_lead(&self.pool, actor, id).await
    }

    /// Leads entered by staff are owned by whoever entered them
    pub async fn create(&self, actor: &Actor, input: LeadInput) -> Result<Lead, ServiceError> {
        ensure(permissions::can_create_leads(actor), "create leads")?;

        let mut lead = Lead {
            id: Uuid::new_v4(),
            name: String::new(),
            email: String::new(),
            company: None,
            phone: None,
            job_title: None,
            notes: None,
            status: LeadStatus::New,
            demo_id: None,
            shared_by_user_id: Some(actor.id),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        apply_input(&mut lead, input)?;
        if let Some(demo_id) = lead.demo_id {
            self.ensure_demo(demo_id).await?;
        }

        let created = self.insert(&lead).await?;
        info!("User {} created lead {}", actor.id, created.id);
        Ok(created)
    }

    /// Register a prospect from a share link. The same email on the same demo
    /// returns the lead already on file; the flag tells whether it is new.
    pub async fn create_from_share(&self, link: &ShareLink, demo: &Demo, input: ProspectInput) -> Result<(Lead, bool), ServiceError> {
        let email = normalize_email(&input.email);
        let name = input.name.trim().to_string();
        Validator::new()
            .required("name", &name)
            .max_len("name", &name, 200)
            .email("email", &email)
            .finish()?;

        let lead = Lead {
            id: Uuid::new_v4(),
            name,
            email,
            company: clean_optional(input.company),
            phone: clean_optional(input.phone),
            job_title: clean_optional(input.job_title),
            notes: None,
            status: LeadStatus::New,
            demo_id: Some(demo.id),
            shared_by_user_id: Some(link.created_by),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };

        // the unique (demo_id, lower(email)) index settles concurrent registrations
        let sql = format!(
            "INSERT INTO leads (id, name, email, company, phone, job_title, notes, status, demo_id, shared_by_user_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             ON CONFLICT DO NOTHING
             RETURNING {}",
            LEAD_COLUMNS
        );
        let inserted = bind_lead(sqlx::query_as::<_, Lead>(&sql), &lead)
            .fetch_optional(&self.pool)
            .await
            .map_err(lead_write_error)?;
        if let Some(created) = inserted {
            info!("Share link {} captured lead {} for demo {}", link.id, created.id, demo.id);
            return Ok((created, true));
        }

        let sql = format!("SELECT {} FROM leads WHERE demo_id = $1 AND lower(email) = $2", LEAD_COLUMNS);
        let existing = sqlx::query_as::<_, Lead>(&sql)
            .bind(demo.id)
            .bind(&lead.email)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("Lead"))?;
        Ok((existing, false))
    }

    pub async fn update(&self, actor: &Actor, id: Uuid, input: LeadInput) -> Result<Lead, ServiceError> {
        let mut lead = accessible_lead(&self.pool, actor, id).await?;
        let previous_demo = lead.demo_id;
        apply_input(&mut lead, input)?;
        if let Some(demo_id) = lead.demo_id.filter(|id| Some(*id) != previous_demo) {
            self.ensure_demo(demo_id).await?;
        }

        let sql = format!(
            "UPDATE leads
             SET name = $2, email = $3, company = $4, phone = $5, job_title = $6, notes = $7,
                 status = $8, demo_id = $9, updated_at = now()
             WHERE id = $1
             RETURNING {}",
            LEAD_COLUMNS
        );
        Ok(sqlx::query_as::<_, Lead>(&sql)
            .bind(lead.id)
            .bind(&lead.name)
            .bind(&lead.email)
            .bind(&lead.company)
            .bind(&lead.phone)
            .bind(&lead.job_title)
            .bind(&lead.notes)
            .bind(lead.status.as_str())
            .bind(lead.demo_id)
            .fetch_one(&self.pool)
            .await
            .map_err(lead_write_error)?)
    }

    pub async fn delete(&self, actor: &Actor, id: Uuid) -> Result<(), ServiceError> {
        accessible_lead(&self.pool, actor, id).await?;
        sqlx::query("DELETE FROM leads WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        info!("User {} deleted lead {}", actor.id, id);
        Ok(())
    }

    async fn insert(&self, lead: &Lead) -> Result<Lead, ServiceError> {
        let sql = format!(
            "INSERT INTO leads (id, name, email, company, phone, job_title, notes, status, demo_id, shared_by_user_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING {}",
            LEAD_COLUMNS
        );
        bind_lead(sqlx::query_as::<_, Lead>(&sql), lead)
            .fetch_one(&self.pool)
            .await
            .map_err(lead_write_error)
    }

    async fn ensure_demo(&self, demo_id: Uuid) -> Result<(), ServiceError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM demos WHERE id = $1)")
            .bind(demo_id)
            .fetch_one(&self.pool)
            .await?;
        if exists {
            Ok(())
        } else {
            Err(ValidationErrors::single("demo_id", "Demo does not exist").into())
        }
    }
}

type LeadQuery<'q> = sqlx::query::QueryAs<'q, Postgres, Lead, sqlx::postgres::PgArguments>;

/// Binds $1..$10 in `insert` column order
fn bind_lead<'q>(query: LeadQuery<'q>, lead: &'q Lead) -> LeadQuery<'q> {
    query
        .bind(lead.id)
        .bind(&lead.name)
        .bind(&lead.email)
        .bind(&lead.company)
        .bind(&lead.phone)
        .bind(&lead.job_title)
        .bind(&lead.notes)
        .bind(lead.status.as_str())
        .bind(lead.demo_id)
        .bind(lead.shared_by_user_id)
}

fn lead_write_error(err: sqlx::Error) -> ServiceError {
    match conflict_on_unique(err, "A lead with this email already exists for this demo") {
        ServiceError::Database(crate::database::DatabaseError::Sqlx(err)) => {
            invalid_reference(err, "demo_id", "Demo does not exist")
        }
        other => other,
    }
}

fn apply_input(lead: &mut Lead, input: LeadInput) -> Result<(), ServiceError> {
    if let Some(name) = input.name {
        lead.name = name.trim().to_string();
    }
    if let Some(email) = input.email {
        lead.email = normalize_email(&email);
    }
    patch_optional(&mut lead.company, input.company);
    patch_optional(&mut lead.phone, input.phone);
    patch_optional(&mut lead.job_title, input.job_title);
    patch_optional(&mut lead.notes, input.notes);
    if let Some(status) = input.status {
        lead.status = status;
    }
    if input.demo_id.is_some() {
        lead.demo_id = input.demo_id;
    }

    Validator::new()
        .required("name", &lead.name)
        .max_len("name", &lead.name, 200)
        .email("email", &lead.email)
        .finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lead() -> Lead {
        Lead {
            id: Uuid::new_v4(),
            name: "Dana Prospect".into(),
            email: "dana@globex.example".into(),
            company: Some("Globex".into()),
            phone: None,
            job_title: None,
            notes: None,
            status: LeadStatus::New,
            demo_id: None,
            shared_by_user_id: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn update_normalizes_email_and_moves_status() {
        let mut l = lead();
        let input = LeadInput {
            email: Some(" Dana@Globex.Example ".into()),
            status: Some(LeadStatus::Qualified),
            notes: Some("Wants a pilot".into()),
            ..Default::default()
        };
        apply_input(&mut l, input).unwrap();
        assert_eq!(l.email, "dana@globex.example");
        assert_eq!(l.status, LeadStatus::Qualified);
        assert_eq!(l.notes.as_deref(), Some("Wants a pilot"));
        assert_eq!(l.company.as_deref(), Some("Globex"));
    }

    #[test]
    fn invalid_email_is_rejected() {
        let mut l = lead();
        let input = LeadInput {
            email: Some("not-an-email".into()),
            ..Default::default()
        };
        match apply_input(&mut l, input) {
            Err(ServiceError::Validation(err)) => assert!(err.fields.contains_key("email")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn lead_status_parses_from_json() {
        let input: LeadFilter = serde_json::from_value(serde_json::json!({"status": "contacted"})).unwrap();
        assert_eq!(input.status, Some(LeadStatus::Contacted));
    }
}
