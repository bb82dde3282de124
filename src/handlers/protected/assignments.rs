// handlers/protected/assignments.rs

use axum::{extract::rejection::JsonRejection, Extension, Json};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::database::models::DemoAssignment;
use crate::handlers::ApiPath;
use crate::middleware::{ApiResponse, ApiResult, ValidatedUser};
use crate::services::assignment_service::AssignmentInput;
use crate::services::AssignmentService;

/// GET /api/demos/:id/assignments - Who the demo is assigned to (admin)
pub async fn assignments_get(
    Extension(user): Extension<ValidatedUser>,
    ApiPath(demo_id): ApiPath<Uuid>,
) -> ApiResult<Vec<DemoAssignment>> {
    let assignments = AssignmentService::connect().await?;
    Ok(ApiResponse::success(assignments.list(&user.actor(), demo_id).await?))
}

/// POST /api/demos/:id/assignments - Assign the demo to a user (admin)
pub async fn assignments_post(
    Extension(user): Extension<ValidatedUser>,
    ApiPath(demo_id): ApiPath<Uuid>,
    payload: Result<Json<AssignmentInput>, JsonRejection>,
) -> ApiResult<DemoAssignment> {
    let Json(input) = payload?;
    let assignments = AssignmentService::connect().await?;
    Ok(ApiResponse::created(
        assignments.assign(&user.actor(), demo_id, input.user_id).await?,
    ))
}

/// DELETE /api/demos/:id/assignments/:user_id (admin)
pub async fn assignment_delete(
    Extension(user): Extension<ValidatedUser>,
    ApiPath((demo_id, user_id)): ApiPath<(Uuid, Uuid)>,
) -> ApiResult<Value> {
    let assignments = AssignmentService::connect().await?;
    assignments.unassign(&user.actor(), demo_id, user_id).await?;
    Ok(ApiResponse::success(json!({ "demo_id": demo_id, "user_id": user_id, "deleted": true })))
}
