// handlers/protected/share_links.rs

use axum::{extract::rejection::JsonRejection, Extension, Json};
use uuid::Uuid;

use crate::database::models::ShareLink;
use crate::handlers::ApiPath;
use crate::middleware::{ApiResponse, ApiResult, ValidatedUser};
use crate::services::share_link_service::{CreatedShareLink, ShareLinkInput};
use crate::services::ShareLinkService;

/// GET /api/demos/:id/share-links - Admins see all links, sales their own
pub async fn share_links_get(
    Extension(user): Extension<ValidatedUser>,
    ApiPath(demo_id): ApiPath<Uuid>,
) -> ApiResult<Vec<ShareLink>> {
    let links = ShareLinkService::connect().await?;
    Ok(ApiResponse::success(links.list(&user.actor(), demo_id).await?))
}

/// POST /api/demos/:id/share-links - Create a link; the raw token is only in this response
///
/// An empty body is accepted and yields an open-ended link without credentials.
pub async fn share_links_post(
    Extension(user): Extension<ValidatedUser>,
    ApiPath(demo_id): ApiPath<Uuid>,
    payload: Result<Json<ShareLinkInput>, JsonRejection>,
) -> ApiResult<CreatedShareLink> {
    let input = match payload {
        Ok(Json(input)) => input,
        Err(JsonRejection::MissingJsonContentType(_)) => ShareLinkInput::default(),
        Err(e) => return Err(e.into()),
    };
    let links = ShareLinkService::connect().await?;
    Ok(ApiResponse::created(links.create(&user.actor(), demo_id, input).await?))
}

/// DELETE /api/share-links/:id - Revoke (admin any, sales own)
pub async fn share_link_delete(
    Extension(user): Extension<ValidatedUser>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<ShareLink> {
    let links = ShareLinkService::connect().await?;
    Ok(ApiResponse::success(links.revoke(&user.actor(), id).await?))
}
