use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use tracing::info;
use uuid::Uuid;

use super::demo_service::fetch_demo;
use super::lead_service::{accessible_lead, fetch_lead};
use super::{ensure, ServiceError};
use crate::auth::permissions::{self, Actor};
use crate::database::manager::DatabaseManager;
use crate::database::models::{Demo, Feedback};
use crate::database::pagination::{Page, PageQuery, SortDirection, SortSpec};
use crate::validation::{clean_optional, ValidationErrors, Validator};

const FEEDBACK_SORT: SortSpec = SortSpec {
    fields: &[("created_at", "f.created_at"), ("overall_rating", "f.overall_rating")],
    default_column: "f.created_at",
    default_direction: SortDirection::Desc,
};

const FEEDBACK_COLUMNS: &str =
    "f.id, f.lead_id, f.demo_id, f.overall_rating, f.ease_of_use_rating, f.relevance_rating, f.comments, f.created_at";

/// Ratings and comments as submitted
#[derive(Debug, Clone, Deserialize)]
pub struct Ratings {
    pub overall_rating: i16,
    pub ease_of_use_rating: Option<i16>,
    pub relevance_rating: Option<i16>,
    pub comments: Option<String>,
}

impl Ratings {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut validator = Validator::new();
        validator
            .rating("overall_rating", self.overall_rating)
            .optional_rating("ease_of_use_rating", self.ease_of_use_rating)
            .optional_rating("relevance_rating", self.relevance_rating);
        if let Some(comments) = &self.comments {
            validator.max_len("comments", comments, 5000);
        }
        validator.finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackInput {
    pub lead_id: Uuid,
    /// Defaults to the demo the lead came in through
    pub demo_id: Option<Uuid>,
    #[serde(flatten)]
    pub ratings: Ratings,
}

/// Feedback a prospect submits through a share link
#[derive(Debug, Clone, Deserialize)]
pub struct SharedFeedbackInput {
    pub lead_id: Uuid,
    #[serde(flatten)]
    pub ratings: Ratings,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedbackFilter {
    pub demo_id: Option<Uuid>,
    pub lead_id: Option<Uuid>,
}

/// Average ratings over a set of feedback rows
#[derive(Debug, Clone, Default, Serialize, FromRow)]
pub struct RatingSummary {
    pub count: i64,
    pub average_overall: Option<f64>,
    pub average_ease_of_use: Option<f64>,
    pub average_relevance: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DemoFeedback {
    pub items: Vec<Feedback>,
    pub summary: RatingSummary,
}

pub struct FeedbackService {
    pool: PgPool,
}

impl FeedbackService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect() -> Result<Self, ServiceError> {
        Ok(Self::new(DatabaseManager::pool().await?))
    }

    /// Scope a `feedback f JOIN leads l` query to what the actor may see
    fn push_scope<'a>(actor: &Actor, builder: &mut QueryBuilder<'a, Postgres>) {
        builder.push(" WHERE 1=1");
        if permissions::leads_scoped_to_owner(actor) {
            builder.push(" AND l.shared_by_user_id = ").push_bind(actor.id);
        }
    }

    pub async fn list(&self, actor: &Actor, filter: &FeedbackFilter, page: &PageQuery) -> Result<Page<Feedback>, ServiceError> {
        ensure(permissions::can_view_feedback(actor), "view feedback")?;
        let pagination = page.resolve(&FEEDBACK_SORT)?;

        let push_filters = |builder: &mut QueryBuilder<'_, Postgres>| {
            Self::push_scope(actor, builder);
            if let Some(demo_id) = filter.demo_id {
                builder.push(" AND f.demo_id = ").push_bind(demo_id);
            }
            if let Some(lead_id) = filter.lead_id {
                builder.push(" AND f.lead_id = ").push_bind(lead_id);
            }
        };

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM feedback f JOIN leads l ON l.id = f.lead_id");
        push_filters(&mut count);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM feedback f JOIN leads l ON l.id = f.lead_id",
            FEEDBACK_COLUMNS
        ));
        push_filters(&mut select);
        pagination.push_to(&mut select);
        let items = select.build_query_as::<Feedback>().fetch_all(&self.pool).await?;

        Ok(Page::new(items, total, &pagination))
    }

    pub async fn for_lead(&self, actor: &Actor, lead_id: Uuid) -> Result<Vec<Feedback>, ServiceError> {
        ensure(permissions::can_view_feedback(actor), "view feedback")?;
        accessible_lead(&self.pool, actor, lead_id).await?;

        let sql = format!(
            "SELECT {} FROM feedback f WHERE f.lead_id = $1 ORDER BY f.created_at DESC",
            FEEDBACK_COLUMNS
        );
        Ok(sqlx::query_as::<_, Feedback>(&sql).bind(lead_id).fetch_all(&self.pool).await?)
    }

    pub async fn for_demo(&self, actor: &Actor, demo_id: Uuid) -> Result<DemoFeedback, ServiceError> {
        ensure(permissions::can_view_feedback(actor), "view feedback")?;
        fetch_demo(&self.pool, demo_id).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM feedback f JOIN leads l ON l.id = f.lead_id",
            FEEDBACK_COLUMNS
        ));
        Self::push_scope(actor, &mut select);
        select.push(" AND f.demo_id = ").push_bind(demo_id);
        select.push(" ORDER BY f.created_at DESC");
        let items = select.build_query_as::<Feedback>().fetch_all(&self.pool).await?;

        Ok(DemoFeedback {
            summary: summarize(&items),
            items,
        })
    }

    pub async fn create(&self, actor: &Actor, input: FeedbackInput) -> Result<Feedback, ServiceError> {
        let lead = fetch_lead(&self.pool, input.lead_id).await?;
        ensure(permissions::can_record_feedback(actor, lead.shared_by_user_id), "record feedback for this lead")?;
        input.ratings.validate()?;

        let demo_id = match input.demo_id.or(lead.demo_id) {
            Some(demo_id) => demo_id,
            None => return Err(ValidationErrors::single("demo_id", "This field is required").into()),
        };
        fetch_demo(&self.pool, demo_id).await?;

        let feedback = self.insert(lead.id, demo_id, input.ratings).await?;
        info!("User {} recorded feedback {} for lead {}", actor.id, feedback.id, lead.id);
        Ok(feedback)
    }

    /// The lead must have come in through the same demo the link points at
    pub async fn create_from_share(&self, demo: &Demo, input: SharedFeedbackInput) -> Result<Feedback, ServiceError> {
        let lead = fetch_lead(&self.pool, input.lead_id).await?;
        if lead.demo_id != Some(demo.id) {
            return Err(ServiceError::not_found("Lead"));
        }
        input.ratings.validate()?;

        let feedback = self.insert(lead.id, demo.id, input.ratings).await?;
        info!("Lead {} left feedback on demo {}", lead.id, demo.id);
        Ok(feedback)
    }

    pub async fn delete(&self, actor: &Actor, id: Uuid) -> Result<(), ServiceError> {
        ensure(permissions::can_delete_feedback(actor), "delete feedback")?;
        let result = sqlx::query("DELETE FROM feedback WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found("Feedback"));
        }
        info!("User {} deleted feedback {}", actor.id, id);
        Ok(())
    }

    async fn insert(&self, lead_id: Uuid, demo_id: Uuid, ratings: Ratings) -> Result<Feedback, ServiceError> {
        let sql = format!(
            "INSERT INTO feedback AS f (id, lead_id, demo_id, overall_rating, ease_of_use_rating, relevance_rating, comments)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {}",
            FEEDBACK_COLUMNS
        );
        Ok(sqlx::query_as::<_, Feedback>(&sql)
            .bind(Uuid::new_v4())
            .bind(lead_id)
            .bind(demo_id)
            .bind(ratings.overall_rating)
            .bind(ratings.ease_of_use_rating)
            .bind(ratings.relevance_rating)
            .bind(clean_optional(ratings.comments))
            .fetch_one(&self.pool)
            .await?)
    }
}

fn average(values: impl Iterator<Item = i16>) -> Option<f64> {
    let (sum, count) = values.fold((0i64, 0i64), |(sum, count), v| (sum + v as i64, count + 1));
    if count == 0 {
        return None;
    }
    let avg = sum as f64 / count as f64;
    Some((avg * 100.0).round() / 100.0)
}

pub fn summarize(items: &[Feedback]) -> RatingSummary {
    RatingSummary {
        count: items.len() as i64,
        average_overall: average(items.iter().map(|f| f.overall_rating)),
        average_ease_of_use: average(items.iter().filter_map(|f| f.ease_of_use_rating)),
        average_relevance: average(items.iter().filter_map(|f| f.relevance_rating)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feedback(overall: i16, ease: Option<i16>) -> Feedback {
        Feedback {
            id: Uuid::new_v4(),
            lead_id: Uuid::new_v4(),
            demo_id: Uuid::new_v4(),
            overall_rating: overall,
            ease_of_use_rating: ease,
            relevance_rating: None,
            comments: None,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn summary_averages_present_ratings_only() {
        let summary = summarize(&[feedback(5, Some(4)), feedback(4, None), feedback(2, Some(3))]);
        assert_eq!(summary.count, 3);
        assert_eq!(summary.average_overall, Some(3.67));
        assert_eq!(summary.average_ease_of_use, Some(3.5));
        assert_eq!(summary.average_relevance, None);
    }

    #[test]
    fn empty_summary_has_no_averages() {
        let summary = summarize(&[]);
        assert_eq!(summary.count, 0);
        assert!(summary.average_overall.is_none());
    }

    #[test]
    fn ratings_out_of_range_are_rejected() {
        let input: SharedFeedbackInput = serde_json::from_value(json!({
            "lead_id": Uuid::new_v4(),
            "overall_rating": 0,
            "relevance_rating": 6,
            "comments": "Looks great"
        }))
        .unwrap();
        let err = input.ratings.validate().unwrap_err();
        assert!(err.fields.contains_key("overall_rating"));
        assert!(err.fields.contains_key("relevance_rating"));
        assert!(!err.fields.contains_key("ease_of_use_rating"));
    }
}
