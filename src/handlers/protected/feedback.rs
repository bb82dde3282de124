// handlers/protected/feedback.rs

use axum::extract::{rejection::JsonRejection, rejection::QueryRejection, Query};
use axum::{Extension, Json};
use serde_json::Value;
use uuid::Uuid;

use crate::database::models::Feedback;
use crate::database::pagination::{Page, PageQuery};
use crate::handlers::ApiPath;
use crate::middleware::{ApiResponse, ApiResult, ValidatedUser};
use crate::services::feedback_service::{DemoFeedback, FeedbackFilter, FeedbackInput};
use crate::services::FeedbackService;

/// GET /api/feedback - Admins see everything, sales feedback from their own leads
///
/// Filters: `demo_id`, `lead_id`.
pub async fn feedback_get(
    Extension(user): Extension<ValidatedUser>,
    page: Result<Query<PageQuery>, QueryRejection>,
    filter: Result<Query<FeedbackFilter>, QueryRejection>,
) -> ApiResult<Page<Feedback>> {
    let Query(page) = page?;
    let Query(filter) = filter?;
    let feedback = FeedbackService::connect().await?;
    Ok(ApiResponse::success(feedback.list(&user.actor(), &filter, &page).await?))
}

/// POST /api/feedback - Record feedback on behalf of a lead
pub async fn feedback_post(
    Extension(user): Extension<ValidatedUser>,
    payload: Result<Json<FeedbackInput>, JsonRejection>,
) -> ApiResult<Feedback> {
    let Json(input) = payload?;
    let feedback = FeedbackService::connect().await?;
    Ok(ApiResponse::created(feedback.create(&user.actor(), input).await?))
}

/// DELETE /api/feedback/:id (admin)
pub async fn feedback_delete(Extension(user): Extension<ValidatedUser>, ApiPath(id): ApiPath<Uuid>) -> ApiResult<Value> {
    let feedback = FeedbackService::connect().await?;
    feedback.delete(&user.actor(), id).await?;
    Ok(ApiResponse::deleted(id))
}

/// GET /api/demos/:id/feedback - Feedback for one demo with rating averages
pub async fn demo_feedback_get(
    Extension(user): Extension<ValidatedUser>,
    ApiPath(demo_id): ApiPath<Uuid>,
) -> ApiResult<DemoFeedback> {
    let feedback = FeedbackService::connect().await?;
    Ok(ApiResponse::success(feedback.for_demo(&user.actor(), demo_id).await?))
}
