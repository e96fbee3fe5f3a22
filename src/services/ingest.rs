//! Original-image registration
//!
//! An original enters the system exactly once per storage path: uploads get
//! fresh uuid-derived paths, URL downloads get URL-hash-derived paths so
//! re-ingesting the same URL returns the existing record instead of
//! duplicating it. Durable-store failure here is fatal because there is no
//! fallback source of truth for the record.

use tracing::{debug, info};
use uuid::Uuid;

use crate::database::Database;
use crate::errors::AppError;
use crate::hashing;
use crate::models::{NewOriginalImage, OriginalImage, SourceKind};
use crate::storage::ImageStore;

#[derive(Clone)]
pub struct IngestService {
    db: Database,
    store: ImageStore,
}

impl IngestService {
    pub fn new(db: Database, store: ImageStore) -> Self {
        Self { db, store }
    }

    /// Register directly uploaded bytes
    pub async fn register_upload(
        &self,
        data: &[u8],
        original_filename: &str,
        user_id: Option<Uuid>,
    ) -> Result<OriginalImage, AppError> {
        if data.is_empty() {
            return Err(AppError::validation("file", "uploaded content is empty"));
        }

        let content_hash = hashing::exact_hash(data);
        let (file_name, file_path) = self.store.save_original(data, original_filename).await?;

        let original = self
            .register_path(NewOriginalImage {
                file_name,
                original_file_name: original_filename.to_string(),
                file_path,
                content_hash,
                source_kind: SourceKind::Upload,
                source_url: None,
                user_id,
            })
            .await?;

        info!(
            "Registered uploaded original {} at {}",
            original.id, original.file_path
        );
        Ok(original)
    }

    /// Download and register an image from a URL
    pub async fn register_from_url(
        &self,
        url: &str,
        user_id: Option<Uuid>,
    ) -> Result<OriginalImage, AppError> {
        let parsed = url::Url::parse(url)
            .map_err(|e| AppError::validation("url", format!("not a valid URL: {}", e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AppError::validation("url", "only http(s) URLs are supported"));
        }

        let data = ImageStore::download_image(url).await?;
        let content_hash = hashing::exact_hash(&data);
        let (file_name, file_path) = self.store.save_url_original(&data, url).await?;

        let original_file_name = parsed
            .path_segments()
            .and_then(|segments| segments.last())
            .filter(|segment| !segment.is_empty())
            .unwrap_or("downloaded")
            .to_string();

        let original = self
            .register_path(NewOriginalImage {
                file_name,
                original_file_name,
                file_path,
                content_hash,
                source_kind: SourceKind::Url,
                source_url: Some(url.to_string()),
                user_id,
            })
            .await?;

        info!(
            "Registered url original {} from {}",
            original.id,
            original.source_url.as_deref().unwrap_or("-")
        );
        Ok(original)
    }

    /// Insert unless the storage path is already registered; at most one
    /// record per path
    async fn register_path(&self, new: NewOriginalImage) -> Result<OriginalImage, AppError> {
        if let Some(existing) = self.db.get_original_image_by_path(&new.file_path).await? {
            debug!(
                "Original already registered for {}, returning existing record",
                new.file_path
            );
            return Ok(existing);
        }
        Ok(self.db.insert_original_image(new).await?)
    }

    pub async fn get_original(&self, id: Uuid) -> Result<OriginalImage, AppError> {
        self.db
            .get_original_image(id)
            .await?
            .ok_or_else(|| AppError::not_found("original image", id.to_string()))
    }

    pub async fn get_original_by_path(&self, path: &str) -> Result<OriginalImage, AppError> {
        self.db
            .get_original_image_by_path(path)
            .await?
            .ok_or_else(|| AppError::not_found("original image", path))
    }

    /// Processing history: most recently ingested originals
    pub async fn recent_originals(&self, limit: i64) -> Result<Vec<OriginalImage>, AppError> {
        Ok(self.db.list_recent_originals(limit).await?)
    }
}
