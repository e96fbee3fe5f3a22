//! Version get-or-create
//!
//! Identical parameters always resolve to the first artifact ever produced
//! for them. The durable unique index on (original, param_hash) is the
//! authority; the volatile `version_params:` mirror is a read-through
//! optimization with a TTL and the `version:` mirror serves lookups by
//! number. A unique violation on insert means a concurrent identical request
//! won the race, so the engine re-reads and returns the winner.

use tracing::{debug, info};
use uuid::Uuid;

use crate::cache::{version_key, version_params_key, CacheStore};
use crate::database::Database;
use crate::errors::AppError;
use crate::hashing;
use crate::models::{ImageVersion, NewImageVersion};
use crate::params::TransformRequest;

#[derive(Clone)]
pub struct VersioningService {
    db: Database,
    cache: CacheStore,
    version_ttl_secs: u64,
}

impl VersioningService {
    pub fn new(db: Database, cache: CacheStore, version_ttl_secs: u64) -> Self {
        Self {
            db,
            cache,
            version_ttl_secs,
        }
    }

    /// Return the existing version for this parameter set or mint a new one
    ///
    /// When an existing version is found the candidate artifact path is
    /// discarded: the artifact already produced for these parameters wins.
    /// Durable-store failure is fatal here; volatile mirroring is not.
    pub async fn get_or_create_version(
        &self,
        original_image_id: Uuid,
        request: &TransformRequest,
        candidate_artifact_path: &str,
        user_id: Option<Uuid>,
    ) -> Result<(ImageVersion, bool), AppError> {
        let param_hash = hashing::param_hash(request)?;

        // Volatile read-through before touching the durable store
        if let Some(version) = self.cached_by_params(original_image_id, &param_hash).await {
            return Ok((version, true));
        }

        if let Some(version) = self
            .db
            .find_version_by_params(original_image_id, &param_hash)
            .await?
        {
            self.mirror_version(&version).await;
            return Ok((version, true));
        }

        let new = NewImageVersion {
            original_image_id,
            file_path: candidate_artifact_path.to_string(),
            operation_params: hashing::canonical_params_json(request)?,
            param_hash: param_hash.clone(),
            user_id,
        };

        match self.db.insert_version(new).await? {
            Some(version) => {
                info!(
                    "Minted version {} for original {} ({})",
                    version.version_number,
                    original_image_id,
                    request.namespace()
                );
                self.mirror_version(&version).await;
                Ok((version, false))
            }
            None => {
                // Unique constraint fired: a racing identical request won
                let version = self
                    .db
                    .find_version_by_params(original_image_id, &param_hash)
                    .await?
                    .ok_or_else(|| {
                        AppError::internal(
                            "version insert lost its race but the winner is not readable",
                        )
                    })?;
                debug!(
                    "Concurrent request already created version {} for original {}",
                    version.version_number, original_image_id
                );
                self.mirror_version(&version).await;
                Ok((version, true))
            }
        }
    }

    /// Fetch one version by number, volatile tier first
    pub async fn get_version(
        &self,
        original_image_id: Uuid,
        version_number: i64,
    ) -> Result<Option<ImageVersion>, AppError> {
        let key = version_key(original_image_id, version_number);
        if let Ok(Some(raw)) = self.cache.get(&key).await {
            if let Ok(version) = serde_json::from_str(&raw) {
                return Ok(Some(version));
            }
        }

        let version = self
            .db
            .get_version_by_number(original_image_id, version_number)
            .await?;
        if let Some(version) = &version {
            self.mirror_version(version).await;
        }
        Ok(version)
    }

    /// All versions of one original, in version order
    pub async fn list_versions(
        &self,
        original_image_id: Uuid,
    ) -> Result<Vec<ImageVersion>, AppError> {
        Ok(self.db.find_versions_for_original(original_image_id).await?)
    }

    /// Delete a version durably and drop its volatile mirrors
    pub async fn delete_version(&self, version_id: Uuid) -> Result<ImageVersion, AppError> {
        let version = self
            .db
            .delete_version(version_id)
            .await?
            .ok_or_else(|| AppError::not_found("image version", version_id.to_string()))?;

        for key in [
            version_key(version.original_image_id, version.version_number),
            version_params_key(version.original_image_id, &version.param_hash),
        ] {
            if let Err(e) = self.cache.del(&key).await {
                debug!("Version mirror cleanup for {} skipped: {}", key, e);
            }
        }

        Ok(version)
    }

    async fn cached_by_params(
        &self,
        original_image_id: Uuid,
        param_hash: &str,
    ) -> Option<ImageVersion> {
        let key = version_params_key(original_image_id, param_hash);
        match self.cache.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(version) => Some(version),
                Err(e) => {
                    debug!("Discarding unparseable version mirror {}: {}", key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                debug!("Version mirror read skipped: {}", e);
                None
            }
        }
    }

    /// Mirror a version under both its keys; failures are logged and
    /// swallowed because the durable record already exists
    async fn mirror_version(&self, version: &ImageVersion) {
        let json = match serde_json::to_string(version) {
            Ok(json) => json,
            Err(e) => {
                debug!("Version mirror serialization skipped: {}", e);
                return;
            }
        };

        for key in [
            version_key(version.original_image_id, version.version_number),
            version_params_key(version.original_image_id, &version.param_hash),
        ] {
            if let Err(e) = self
                .cache
                .set_with_expiry(&key, &json, self.version_ttl_secs)
                .await
            {
                debug!("Version mirror write for {} skipped: {}", key, e);
            }
        }
    }
}
