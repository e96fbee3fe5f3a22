//! Transformation pipeline orchestration
//!
//! For each request: validate, look for a cached artifact (exact tier then
//! perceptual tier), and only on a definitive miss delegate to the transform
//! backend. Sub-operations of a composite apply in the fixed canonical order
//! (background removal, resize, rotate, grayscale, blur); a sub-operation
//! failure aborts the request and nothing partial is cached or versioned.
//! Every served request, hit or miss, is registered through the versioning
//! engine, so reuse of an existing artifact still resolves to a version row.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::cache::{
    CacheStore, ImageCacheService, STATS_HITS_EXACT, STATS_HITS_PERCEPTUAL, STATS_MISSES,
};
use crate::database::Database;
use crate::errors::AppError;
use crate::hashing;
use crate::models::{CacheHitKind, OriginalImage, TransformOutcome};
use crate::params::TransformRequest;
use crate::services::VersioningService;
use crate::storage::ImageStore;
use crate::transform::TransformBackend;

pub struct TransformPipeline {
    db: Database,
    lookup: ImageCacheService,
    versioning: VersioningService,
    store: ImageStore,
    backend: Arc<dyn TransformBackend>,
    cache: CacheStore,
    similarity_threshold: f64,
}

impl TransformPipeline {
    pub fn new(
        db: Database,
        cache: CacheStore,
        versioning: VersioningService,
        store: ImageStore,
        backend: Arc<dyn TransformBackend>,
        similarity_threshold: f64,
    ) -> Self {
        Self {
            db,
            lookup: ImageCacheService::new(cache.clone()),
            versioning,
            store,
            backend,
            cache,
            similarity_threshold,
        }
    }

    /// Serve one transformation request against an ingested original
    pub async fn transform(
        &self,
        original: &OriginalImage,
        request: &TransformRequest,
        user_id: Option<Uuid>,
    ) -> Result<TransformOutcome, AppError> {
        request.validate()?;
        let canonical = request.canonicalize();
        let namespace = canonical.namespace();

        let hit = self
            .lookup
            .find_cached_result(&original.file_path, &namespace, self.similarity_threshold)
            .await;

        let counter = match &hit {
            Some(hit) => match hit.kind {
                CacheHitKind::Exact => STATS_HITS_EXACT,
                CacheHitKind::Perceptual { .. } => STATS_HITS_PERCEPTUAL,
            },
            None => STATS_MISSES,
        };
        self.cache.incr_counter(counter).await;

        let outcome = match hit {
            Some(hit) => {
                // Reuse still registers through get-or-create, so this
                // original+params combination resolves to a version row
                let (version, was_cached) = self
                    .versioning
                    .get_or_create_version(original.id, &canonical, &hit.artifact_path, user_id)
                    .await?;
                TransformOutcome {
                    version,
                    was_cached,
                    cache_hit: Some(hit.kind),
                }
            }
            None => self.compute(original, &canonical, &namespace, user_id).await?,
        };

        if let Err(e) = self.db.touch_last_accessed(original.id).await {
            debug!("Last-access bookkeeping skipped: {}", e);
        }

        Ok(outcome)
    }

    /// Full recomputation on a definitive cache miss
    async fn compute(
        &self,
        original: &OriginalImage,
        canonical: &TransformRequest,
        namespace: &str,
        user_id: Option<Uuid>,
    ) -> Result<TransformOutcome, AppError> {
        let bytes = self.store.read(&original.file_path).await?;
        let mut image = self.backend.decode(&bytes)?;

        // Canonical order is the application order
        for op in &canonical.ops {
            image = self.backend.apply(image, op)?;
        }

        let encoded = self.backend.encode(&image)?;
        let param_hash = hashing::param_hash(canonical)?;
        let artifact_path = self
            .store
            .save_artifact(&encoded, &original.file_name, &param_hash)
            .await?;

        info!(
            "Computed {} for original {} -> {}",
            namespace, original.id, artifact_path
        );

        // Mirror into the exact/perceptual tiers, then record durably
        self.lookup
            .record_result(&original.file_path, &artifact_path, namespace)
            .await;

        let (version, was_cached) = self
            .versioning
            .get_or_create_version(original.id, canonical, &artifact_path, user_id)
            .await?;

        Ok(TransformOutcome {
            version,
            was_cached,
            cache_hit: None,
        })
    }
}
