// handlers/protected/media.rs

use axum::extract::{rejection::JsonRejection, Multipart};
use axum::{Extension, Json};
use serde_json::Value;
use uuid::Uuid;

use crate::database::models::DemoMedia;
use crate::error::ApiError;
use crate::handlers::ApiPath;
use crate::middleware::{ApiResponse, ApiResult, ValidatedUser};
use crate::services::media_service::{MediaLink, Upload};
use crate::services::MediaService;
use crate::validation::ValidationErrors;

/// GET /api/demos/:id/media - Media of a demo the caller can see
pub async fn demo_media_get(
    Extension(user): Extension<ValidatedUser>,
    ApiPath(demo_id): ApiPath<Uuid>,
) -> ApiResult<Vec<DemoMedia>> {
    let media = MediaService::connect().await?;
    Ok(ApiResponse::success(media.list(&user.actor(), demo_id).await?))
}

/// POST /api/demos/:id/media - Multipart upload (admin)
///
/// Fields: `file` (required), `caption` (optional). The type is sniffed from the
/// bytes; anything other than an image or video answers 415, and an upload that
/// would exceed the uploader's quota answers 413.
pub async fn demo_media_post(
    Extension(user): Extension<ValidatedUser>,
    ApiPath(demo_id): ApiPath<Uuid>,
    multipart: Multipart,
) -> ApiResult<DemoMedia> {
    let upload = read_upload(multipart).await?;
    let media = MediaService::connect().await?;
    Ok(ApiResponse::created(media.upload(&user.actor(), demo_id, upload).await?))
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, ApiError> {
    let mut upload: Option<Upload> = None;
    let mut caption = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await?;
                upload = Some(Upload {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                    caption: None,
                });
            }
            Some("caption") => caption = Some(field.text().await?),
            _ => {}
        }
    }

    let mut upload = upload.ok_or_else(|| ValidationErrors::single("file", "A file field is required"))?;
    upload.caption = caption;
    Ok(upload)
}

/// POST /api/demos/:id/media/link - Attach an externally hosted image or video (admin)
pub async fn demo_media_link_post(
    Extension(user): Extension<ValidatedUser>,
    ApiPath(demo_id): ApiPath<Uuid>,
    payload: Result<Json<MediaLink>, JsonRejection>,
) -> ApiResult<DemoMedia> {
    let Json(link) = payload?;
    let media = MediaService::connect().await?;
    Ok(ApiResponse::created(media.add_link(&user.actor(), demo_id, link).await?))
}

/// DELETE /api/media/:id - Remove media and give its bytes back to the uploader (admin)
pub async fn media_delete(Extension(user): Extension<ValidatedUser>, ApiPath(id): ApiPath<Uuid>) -> ApiResult<Value> {
    let media = MediaService::connect().await?;
    media.delete(&user.actor(), id).await?;
    Ok(ApiResponse::deleted(id))
}
