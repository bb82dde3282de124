// handlers/protected/leads.rs

use axum::extract::{rejection::JsonRejection, rejection::QueryRejection, Query};
use axum::{Extension, Json};
use serde_json::Value;
use uuid::Uuid;

use crate::database::models::{Feedback, Lead};
use crate::database::pagination::{Page, PageQuery};
use crate::handlers::ApiPath;
use crate::middleware::{ApiResponse, ApiResult, ValidatedUser};
use crate::services::lead_service::{LeadFilter, LeadInput};
use crate::services::{FeedbackService, LeadService};

/// GET /api/leads - Admins see all leads, sales the ones they brought in
///
/// Filters: `status`, `demo_id`, search `q`.
pub async fn leads_get(
    Extension(user): Extension<ValidatedUser>,
    page: Result<Query<PageQuery>, QueryRejection>,
    filter: Result<Query<LeadFilter>, QueryRejection>,
) -> ApiResult<Page<Lead>> {
    let Query(page) = page?;
    let Query(filter) = filter?;
    let leads = LeadService::connect().await?;
    Ok(ApiResponse::success(leads.list(&user.actor(), &filter, &page).await?))
}

/// POST /api/leads - Record a lead owned by the caller (admin, sales)
pub async fn leads_post(
    Extension(user): Extension<ValidatedUser>,
    payload: Result<Json<LeadInput>, JsonRejection>,
) -> ApiResult<Lead> {
    let Json(input) = payload?;
    let leads = LeadService::connect().await?;
    Ok(ApiResponse::created(leads.create(&user.actor(), input).await?))
}

/// GET /api/leads/:id
pub async fn lead_get(Extension(user): Extension<ValidatedUser>, ApiPath(id): ApiPath<Uuid>) -> ApiResult<Lead> {
    let leads = LeadService::connect().await?;
    Ok(ApiResponse::success(leads.get(&user.actor(), id).await?))
}

/// PATCH /api/leads/:id - Update contact details, notes or status
pub async fn lead_patch(
    Extension(user): Extension<ValidatedUser>,
    ApiPath(id): ApiPath<Uuid>,
    payload: Result<Json<LeadInput>, JsonRejection>,
) -> ApiResult<Lead> {
    let Json(input) = payload?;
    let leads = LeadService::connect().await?;
    Ok(ApiResponse::success(leads.update(&user.actor(), id, input).await?))
}

/// DELETE /api/leads/:id - Delete a lead and its feedback
pub async fn lead_delete(Extension(user): Extension<ValidatedUser>, ApiPath(id): ApiPath<Uuid>) -> ApiResult<Value> {
    let leads = LeadService::connect().await?;
    leads.delete(&user.actor(), id).await?;
    Ok(ApiResponse::deleted(id))
}

/// GET /api/leads/:id/feedback - Everything this lead has said
pub async fn lead_feedback_get(
    Extension(user): Extension<ValidatedUser>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Vec<Feedback>> {
    let feedback = FeedbackService::connect().await?;
    Ok(ApiResponse::success(feedback.for_lead(&user.actor(), id).await?))
}
