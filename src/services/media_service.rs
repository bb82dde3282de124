use serde::Deserialize;
use serde_json::{json, Map, Value};
use sqlx::{PgConnection, PgPool};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::demo_service::{fetch_demo, lock_demo, visible_demo, DemoLock};
use super::media_store::{LocalMediaStore, MediaStore};
use super::media_type::{detect_media, validate_media_url};
use super::{ensure, ServiceError, StorageService};
use crate::auth::permissions::{self, Actor};
use crate::config;
use crate::database::manager::DatabaseManager;
use crate::database::models::DemoMedia;
use crate::types::MediaType;
use crate::validation::{clean_optional, ValidationErrors};

const MEDIA_COLUMNS: &str =
    "id, demo_id, media_type, url, file_name, mime_type, size_bytes, metadata, uploaded_by, created_at";

/// A file received from a multipart upload
#[derive(Debug, Clone, Default)]
pub struct Upload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
    pub caption: Option<String>,
}

/// Externally hosted media (e.g. a video platform URL)
#[derive(Debug, Clone, Deserialize)]
pub struct MediaLink {
    pub media_type: MediaType,
    pub url: String,
    pub file_name: Option<String>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

pub struct MediaService {
    pool: PgPool,
    store: Arc<dyn MediaStore>,
}

impl MediaService {
    pub fn new(pool: PgPool, store: Arc<dyn MediaStore>) -> Self {
        Self { pool, store }
    }

    pub async fn connect() -> Result<Self, ServiceError> {
        Ok(Self::new(
            DatabaseManager::pool().await?,
            Arc::new(LocalMediaStore::from_config()),
        ))
    }

    pub(crate) async fn media_for_demo(pool: &PgPool, demo_id: Uuid) -> Result<Vec<DemoMedia>, ServiceError> {
        let sql = format!("SELECT {} FROM demo_media WHERE demo_id = $1 ORDER BY created_at", MEDIA_COLUMNS);
        Ok(sqlx::query_as::<_, DemoMedia>(&sql).bind(demo_id).fetch_all(pool).await?)
    }

    pub async fn list(&self, actor: &Actor, demo_id: Uuid) -> Result<Vec<DemoMedia>, ServiceError> {
        visible_demo(&self.pool, actor, demo_id).await?;
        Self::media_for_demo(&self.pool, demo_id).await
    }

    /// Store an uploaded file against the uploader's quota
    pub async fn upload(&self, actor: &Actor, demo_id: Uuid, upload: Upload) -> Result<DemoMedia, ServiceError> {
        ensure(permissions::can_manage_demos(actor), "upload demo media")?;

        let mut tx = self.pool.begin().await?;
        // demo first, then usage: the same order a demo delete takes them in
        lock_demo(&mut tx, demo_id, DemoLock::Share).await?;

        let max = config::config().storage.max_upload_bytes;
        if upload.bytes.len() > max {
            return Err(ValidationErrors::single("file", format!("File exceeds the {} byte upload limit", max)).into());
        }
        let detected = detect_media(&upload.bytes, upload.content_type.as_deref(), upload.file_name.as_deref())?;
        let size = upload.bytes.len() as i64;

        let usage = StorageService::lock_usage(&mut tx, actor.id).await?;
        let next = usage.quota().with_upload(size)?;

        let key = self.store.put(detected.extension, &upload.bytes).await?;
        let mut metadata = json!({ "storage_key": key });
        if let Some(caption) = clean_optional(upload.caption) {
            metadata["caption"] = Value::String(caption);
        }

        let sql = format!(
            "INSERT INTO demo_media (id, demo_id, media_type, url, file_name, mime_type, size_bytes, metadata, uploaded_by)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {}",
            MEDIA_COLUMNS
        );
        let inserted = sqlx::query_as::<_, DemoMedia>(&sql)
            .bind(Uuid::new_v4())
            .bind(demo_id)
            .bind(detected.media_type.as_str())
            .bind(self.store.url_for(&key))
            .bind(clean_optional(upload.file_name))
            .bind(&detected.mime_type)
            .bind(size)
            .bind(&metadata)
            .bind(actor.id)
            .fetch_one(&mut *tx)
            .await;

        let committed = match inserted {
            Ok(media) => match StorageService::store_total(&mut tx, actor.id, next.total_bytes).await {
                Ok(()) => tx.commit().await.map(|_| media).map_err(ServiceError::from),
                Err(e) => Err(e),
            },
            Err(e) => Err(e.into()),
        };

        match committed {
            Ok(media) => {
                info!(
                    "User {} uploaded {} ({} bytes) to demo {}",
                    actor.id, detected.mime_type, size, demo_id
                );
                Ok(media)
            }
            Err(e) => {
                // the row never landed, so the file is orphaned
                self.remove_files(&[key]).await;
                Err(e)
            }
        }
    }

    /// Attach externally hosted media; it does not count against any quota
    pub async fn add_link(&self, actor: &Actor, demo_id: Uuid, link: MediaLink) -> Result<DemoMedia, ServiceError> {
        ensure(permissions::can_manage_demos(actor), "add demo media")?;
        fetch_demo(&self.pool, demo_id).await?;
        let url = validate_media_url(&link.url)?;

        let sql = format!(
            "INSERT INTO demo_media (id, demo_id, media_type, url, file_name, size_bytes, metadata, uploaded_by)
             VALUES ($1, $2, $3, $4, $5, 0, $6, $7)
             RETURNING {}",
            MEDIA_COLUMNS
        );
        let media = sqlx::query_as::<_, DemoMedia>(&sql)
            .bind(Uuid::new_v4())
            .bind(demo_id)
            .bind(link.media_type.as_str())
            .bind(url.as_str())
            .bind(clean_optional(link.file_name))
            .bind(Value::Object(link.metadata.unwrap_or_default()))
            .bind(actor.id)
            .fetch_one(&self.pool)
            .await?;

        info!("User {} linked {} media to demo {}", actor.id, media.media_type, demo_id);
        Ok(media)
    }

    pub async fn delete(&self, actor: &Actor, media_id: Uuid) -> Result<(), ServiceError> {
        ensure(permissions::can_manage_demos(actor), "delete demo media")?;

        let mut tx = self.pool.begin().await?;
        let sql = format!("SELECT {} FROM demo_media WHERE id = $1 FOR UPDATE", MEDIA_COLUMNS);
        let media = sqlx::query_as::<_, DemoMedia>(&sql)
            .bind(media_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| ServiceError::not_found("Media"))?;

        sqlx::query("DELETE FROM demo_media WHERE id = $1")
            .bind(media_id)
            .execute(&mut *tx)
            .await?;
        if let Some(uploader) = media.uploaded_by {
            StorageService::release(&mut tx, uploader, media.size_bytes).await?;
        }
        tx.commit().await?;

        if let Some(key) = media.stored_key() {
            self.remove_files(&[key.to_string()]).await;
        }
        info!("User {} deleted media {} from demo {}", actor.id, media_id, media.demo_id);
        Ok(())
    }

    /// Remove every media row of a demo inside the caller's transaction, crediting
    /// each uploader. Returns the storage keys to delete once the transaction commits.
    pub async fn release_demo_media(&self, conn: &mut PgConnection, demo_id: Uuid) -> Result<Vec<String>, ServiceError> {
        let sql = format!("SELECT {} FROM demo_media WHERE demo_id = $1 FOR UPDATE", MEDIA_COLUMNS);
        let media = sqlx::query_as::<_, DemoMedia>(&sql)
            .bind(demo_id)
            .fetch_all(&mut *conn)
            .await?;

        let mut per_uploader: BTreeMap<Uuid, i64> = BTreeMap::new();
        for item in &media {
            if let Some(uploader) = item.uploaded_by {
                *per_uploader.entry(uploader).or_default() += item.size_bytes;
            }
        }
        for (uploader, bytes) in per_uploader {
            StorageService::release(&mut *conn, uploader, bytes).await?;
        }

        sqlx::query("DELETE FROM demo_media WHERE demo_id = $1")
            .bind(demo_id)
            .execute(&mut *conn)
            .await?;

        Ok(media
            .iter()
            .filter_map(|item| item.stored_key().map(str::to_string))
            .collect())
    }

    /// Best effort; a leftover file only wastes disk
    pub async fn remove_files(&self, keys: &[String]) {
        for key in keys {
            if let Err(e) = self.store.delete(key).await {
                warn!("Failed to remove stored media {}: {}", key, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_link_parses_type_and_metadata() {
        let link: MediaLink = serde_json::from_value(json!({
            "media_type": "video",
            "url": "https://videos.example.com/watch/42",
            "metadata": {"provider": "example"}
        }))
        .unwrap();
        assert_eq!(link.media_type, MediaType::Video);
        assert_eq!(link.metadata.unwrap()["provider"], "example");
    }

    #[test]
    fn media_link_rejects_unknown_type() {
        let parsed = serde_json::from_value::<MediaLink>(json!({
            "media_type": "audio",
            "url": "https://example.com/a.mp3"
        }));
        assert!(parsed.is_err());
    }
}
