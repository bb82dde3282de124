use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use tracing::info;
use uuid::Uuid;

use super::{ensure, invalid_reference, MediaService, ServiceError};
use crate::auth::permissions::{self, Actor};
use crate::database::manager::DatabaseManager;
use crate::database::models::{Demo, DemoMedia};
use crate::database::pagination::{Page, PageQuery, SortDirection, SortSpec};
use crate::types::{DemoStatus, Role};
use crate::validation::{contains_pattern, patch_optional, ValidationErrors, Validator};

const DEMO_SORT: SortSpec = SortSpec {
    fields: &[("title", "d.title"), ("created_at", "d.created_at"), ("updated_at", "d.updated_at"), ("status", "d.status")],
    default_column: "d.created_at",
    default_direction: SortDirection::Desc,
};

pub(crate) const DEMO_COLUMNS: &str =
    "d.id, d.product_id, d.title, d.content, d.instructions, d.credentials, d.status, d.created_by, d.created_at, d.updated_at";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DemoInput {
    pub product_id: Option<Uuid>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub instructions: Option<String>,
    /// Absent keeps the stored blob, `null` clears it
    #[serde(default, deserialize_with = "present_or_null")]
    pub credentials: Option<Option<Value>>,
    pub status: Option<DemoStatus>,
}

fn present_or_null<'de, D>(deserializer: D) -> Result<Option<Option<Value>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Value>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DemoFilter {
    pub status: Option<DemoStatus>,
    pub product_id: Option<Uuid>,
    pub q: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DemoDetail {
    #[serde(flatten)]
    pub demo: Demo,
    pub product_name: String,
    pub media: Vec<DemoMedia>,
}

/// Load a demo or fail with 404
pub(crate) async fn fetch_demo(pool: &PgPool, id: Uuid) -> Result<Demo, ServiceError> {
    let sql = format!("SELECT {} FROM demos d WHERE d.id = $1", DEMO_COLUMNS);
    sqlx::query_as::<_, Demo>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("Demo"))
}

/// Row lock taken on a demo inside a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DemoLock {
    /// Held while media is attached; blocks deletion until the upload commits
    Share,
    /// Held while the demo is deleted; blocks new media
    Update,
}

impl DemoLock {
    fn to_sql(self) -> &'static str {
        match self {
            DemoLock::Share => "FOR SHARE",
            DemoLock::Update => "FOR UPDATE",
        }
    }
}

/// Load and lock a demo inside the caller's transaction, or fail with 404
pub(crate) async fn lock_demo(conn: &mut PgConnection, id: Uuid, lock: DemoLock) -> Result<Demo, ServiceError> {
    let sql = format!("SELECT {} FROM demos d WHERE d.id = $1 {}", DEMO_COLUMNS, lock.to_sql());
    sqlx::query_as::<_, Demo>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Demo"))
}

pub(crate) async fn is_assigned(pool: &PgPool, demo_id: Uuid, user_id: Uuid) -> Result<bool, ServiceError> {
    Ok(sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM demo_assignments WHERE demo_id = $1 AND user_id = $2)")
        .bind(demo_id)
        .bind(user_id)
        .fetch_one(pool)
        .await?)
}

/// Load a demo the actor may see, already redacted for them. Hidden demos look missing.
pub(crate) async fn visible_demo(pool: &PgPool, actor: &Actor, id: Uuid) -> Result<Demo, ServiceError> {
    let demo = fetch_demo(pool, id).await?;
    let assigned = match actor.role {
        Role::Buyer => is_assigned(pool, id, actor.id).await?,
        _ => false,
    };
    if !permissions::can_view_demo(actor, demo.is_active(), assigned) {
        return Err(ServiceError::not_found("Demo"));
    }
    Ok(redact_for(actor, demo, assigned))
}

fn redact_for(actor: &Actor, demo: Demo, assigned: bool) -> Demo {
    if permissions::can_view_credentials(actor, assigned) {
        demo
    } else {
        demo.redacted()
    }
}

pub struct DemoService {
    pool: PgPool,
}

impl DemoService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect() -> Result<Self, ServiceError> {
        Ok(Self::new(DatabaseManager::pool().await?))
    }

    pub async fn list(&self, actor: &Actor, filter: &DemoFilter, page: &PageQuery) -> Result<Page<Demo>, ServiceError> {
        let pagination = page.resolve(&DEMO_SORT)?;
        let buyer = actor.role == Role::Buyer;

        let push_filters = |builder: &mut QueryBuilder<'_, Postgres>| {
            builder.push(" WHERE 1=1");
            if buyer {
                builder.push(" AND d.status = 'active'");
                builder
                    .push(" AND EXISTS (SELECT 1 FROM demo_assignments a WHERE a.demo_id = d.id AND a.user_id = ")
                    .push_bind(actor.id)
                    .push(")");
            }
            if let Some(status) = filter.status {
                builder.push(" AND d.status = ").push_bind(status.as_str());
            }
            if let Some(product_id) = filter.product_id {
                builder.push(" AND d.product_id = ").push_bind(product_id);
            }
            if let Some(q) = filter.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
                let pattern = contains_pattern(q);
                builder.push(" AND (d.title ILIKE ").push_bind(pattern.clone());
                builder.push(" OR d.content ILIKE ").push_bind(pattern);
                builder.push(")");
            }
        };

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM demos d");
        push_filters(&mut count);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM demos d", DEMO_COLUMNS));
        push_filters(&mut select);
        pagination.push_to(&mut select);
        let demos = select.build_query_as::<Demo>().fetch_all(&self.pool).await?;

        // buyers only ever list demos assigned to them
        Ok(Page::new(demos, total, &pagination).map(|demo| redact_for(actor, demo, buyer)))
    }

    pub async fn get(&self, actor: &Actor, id: Uuid) -> Result<DemoDetail, ServiceError> {
        let demo = visible_demo(&self.pool, actor, id).await?;

        let product_name: String = sqlx::query_scalar("SELECT name FROM products WHERE id = $1")
            .bind(demo.product_id)
            .fetch_one(&self.pool)
            .await?;
        let media = MediaService::media_for_demo(&self.pool, id).await?;

        Ok(DemoDetail {
            demo,
            product_name,
            media,
        })
    }

    pub async fn create(&self, actor: &Actor, input: DemoInput) -> Result<Demo, ServiceError> {
        ensure(permissions::can_manage_demos(actor), "create demos")?;

        let mut demo = Demo {
            id: Uuid::new_v4(),
            product_id: input.product_id.unwrap_or_else(Uuid::nil),
            title: String::new(),
            content: None,
            instructions: None,
            credentials: None,
            status: DemoStatus::Active,
            created_by: Some(actor.id),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        let product_given = input.product_id.is_some();
        apply_input(&mut demo, input)?;
        if !product_given {
            return Err(ValidationErrors::single("product_id", "This field is required").into());
        }
        self.ensure_product(demo.product_id).await?;

        let sql = format!(
            "INSERT INTO demos AS d (id, product_id, title, content, instructions, credentials, status, created_by)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {}",
            DEMO_COLUMNS
        );
        let created = sqlx::query_as::<_, Demo>(&sql)
            .bind(demo.id)
            .bind(demo.product_id)
            .bind(&demo.title)
            .bind(&demo.content)
            .bind(&demo.instructions)
            .bind(&demo.credentials)
            .bind(demo.status.as_str())
            .bind(demo.created_by)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| invalid_reference(e, "product_id", "Product does not exist"))?;

        info!("User {} created demo {} ({})", actor.id, created.title, created.id);
        Ok(created)
    }

    pub async fn update(&self, actor: &Actor, id: Uuid, input: DemoInput) -> Result<Demo, ServiceError> {
        ensure(permissions::can_manage_demos(actor), "update demos")?;
        let mut demo = fetch_demo(&self.pool, id).await?;
        let previous_product = demo.product_id;
        apply_input(&mut demo, input)?;
        if demo.product_id != previous_product {
            self.ensure_product(demo.product_id).await?;
        }
        self.save(&demo).await
    }

    pub async fn set_status(&self, actor: &Actor, id: Uuid, status: DemoStatus) -> Result<Demo, ServiceError> {
        ensure(permissions::can_manage_demos(actor), "change demo status")?;
        let mut demo = fetch_demo(&self.pool, id).await?;
        demo.status = status;
        let saved = self.save(&demo).await?;
        info!("User {} set demo {} to {}", actor.id, id, status);
        Ok(saved)
    }

    /// Deletes the demo with its media, assignments, share links and feedback
    pub async fn delete(&self, actor: &Actor, id: Uuid, media: &MediaService) -> Result<(), ServiceError> {
        ensure(permissions::can_manage_demos(actor), "delete demos")?;

        let mut tx = self.pool.begin().await?;
        // waits for in-flight uploads, then keeps new ones out until the delete commits
        lock_demo(&mut tx, id, DemoLock::Update).await?;
        let keys = media.release_demo_media(&mut *tx, id).await?;
        sqlx::query("DELETE FROM demos WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        media.remove_files(&keys).await;
        info!("User {} deleted demo {}", actor.id, id);
        Ok(())
    }

    async fn ensure_product(&self, product_id: Uuid) -> Result<(), ServiceError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)")
            .bind(product_id)
            .fetch_one(&self.pool)
            .await?;
        if exists {
            Ok(())
        } else {
            Err(ValidationErrors::single("product_id", "Product does not exist").into())
        }
    }

    async fn save(&self, demo: &Demo) -> Result<Demo, ServiceError> {
        let sql = format!(
            "UPDATE demos AS d
             SET product_id = $2, title = $3, content = $4, instructions = $5, credentials = $6,
                 status = $7, updated_at = now()
             WHERE d.id = $1
             RETURNING {}",
            DEMO_COLUMNS
        );
        Ok(sqlx::query_as::<_, Demo>(&sql)
            .bind(demo.id)
            .bind(demo.product_id)
            .bind(&demo.title)
            .bind(&demo.content)
            .bind(&demo.instructions)
            .bind(&demo.credentials)
            .bind(demo.status.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| invalid_reference(e, "product_id", "Product does not exist"))?)
    }
}

fn apply_input(demo: &mut Demo, input: DemoInput) -> Result<(), ServiceError> {
    if let Some(product_id) = input.product_id {
        demo.product_id = product_id;
    }
    if let Some(title) = input.title {
        demo.title = title.trim().to_string();
    }
    patch_optional(&mut demo.content, input.content);
    patch_optional(&mut demo.instructions, input.instructions);
    if let Some(credentials) = input.credentials {
        demo.credentials = credentials.filter(|value| !value.is_null());
    }
    if let Some(status) = input.status {
        demo.status = status;
    }

    let mut validator = Validator::new();
    validator.required("title", &demo.title).max_len("title", &demo.title, 200);
    if matches!(&demo.credentials, Some(value) if !value.is_object()) {
        validator.add("credentials", "Must be a JSON object");
    }
    validator.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_locks_render_row_lock_clauses() {
        assert_eq!(DemoLock::Share.to_sql(), "FOR SHARE");
        assert_eq!(DemoLock::Update.to_sql(), "FOR UPDATE");
    }
    use serde_json::json;

    fn demo() -> Demo {
        Demo {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            title: "Onboarding tour".into(),
            content: None,
            instructions: None,
            credentials: Some(json!({"username": "demo", "password": "hunter2"})),
            status: DemoStatus::Active,
            created_by: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn credentials_absent_null_and_present() {
        let absent: DemoInput = serde_json::from_value(json!({"title": "x"})).unwrap();
        assert_eq!(absent.credentials, None);

        let null: DemoInput = serde_json::from_value(json!({"credentials": null})).unwrap();
        assert_eq!(null.credentials, Some(None));

        let mut d = demo();
        apply_input(&mut d, absent).unwrap();
        assert!(d.credentials.is_some());
        apply_input(&mut d, null).unwrap();
        assert!(d.credentials.is_none());
    }

    #[test]
    fn credentials_must_be_an_object() {
        let mut d = demo();
        let input: DemoInput = serde_json::from_value(json!({"credentials": "secret"})).unwrap();
        match apply_input(&mut d, input) {
            Err(ServiceError::Validation(err)) => assert!(err.fields.contains_key("credentials")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn buyers_without_assignment_get_redacted_demo() {
        let buyer = Actor::new(Uuid::new_v4(), Role::Buyer);
        assert!(redact_for(&buyer, demo(), false).credentials.is_none());
        assert!(redact_for(&buyer, demo(), true).credentials.is_some());

        let sales = Actor::new(Uuid::new_v4(), Role::Sales);
        assert!(redact_for(&sales, demo(), false).credentials.is_some());
    }

    #[test]
    fn blank_title_is_rejected() {
        let mut d = demo();
        let input = DemoInput {
            title: Some("   ".into()),
            ..Default::default()
        };
        assert!(apply_input(&mut d, input).is_err());
    }
}
