// handlers/protected/dashboard.rs

use axum::Extension;

use crate::middleware::{ApiResponse, ApiResult, ValidatedUser};
use crate::services::dashboard_service::Dashboard;
use crate::services::DashboardService;

/// GET /api/dashboard - Counts and rating averages scoped to the caller's role
pub async fn dashboard_get(Extension(user): Extension<ValidatedUser>) -> ApiResult<Dashboard> {
    let dashboard = DashboardService::connect().await?;
    Ok(ApiResponse::success(dashboard.overview(&user.actor()).await?))
}
