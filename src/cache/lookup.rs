//! Two-tier cache lookup
//!
//! The exact-hash tier answers byte-identical resubmissions in O(1); the
//! perceptual tier scans the bounded per-namespace candidate set and accepts
//! the first candidate at or above the similarity threshold. Every failure
//! along the way degrades to a miss: a cache-lookup problem must never block
//! a transformation from proceeding via full recomputation.

use chrono::Utc;
use tracing::{debug, info, warn};

use super::{exact_hash_key, metadata_key, phash_set_key, CacheStore};
use crate::hashing::{self, PerceptualHash};
use crate::models::{CacheEntryMeta, CacheHit, CacheHitKind};

#[derive(Clone)]
pub struct ImageCacheService {
    store: CacheStore,
}

impl ImageCacheService {
    pub fn new(store: CacheStore) -> Self {
        Self { store }
    }

    /// Find a previously produced artifact for this original and namespace
    ///
    /// Pure read: no tier is written. Returns `None` on any hashing or store
    /// failure as well as on a genuine miss.
    pub async fn find_cached_result(
        &self,
        original_path: &str,
        namespace: &str,
        similarity_threshold: f64,
    ) -> Option<CacheHit> {
        // Fast path: exact content hash
        match hashing::exact_hash_file(original_path) {
            Ok(exact) => {
                match self.store.get(&exact_hash_key(namespace, &exact)).await {
                    Ok(Some(artifact_path)) => {
                        info!("Exact hash cache hit for {}", original_path);
                        return Some(CacheHit {
                            artifact_path,
                            kind: CacheHitKind::Exact,
                        });
                    }
                    Ok(None) => {}
                    Err(e) => debug!("Exact tier unavailable, treating as miss: {}", e),
                }
            }
            Err(e) => debug!(
                "Exact hash unavailable for {}, skipping exact tier: {}",
                original_path, e
            ),
        }

        // Fuzzy path: perceptual scan of the per-namespace candidate set
        let image = match image::open(original_path) {
            Ok(image) => image,
            Err(e) => {
                debug!(
                    "Could not decode {} for perceptual lookup: {}",
                    original_path, e
                );
                return None;
            }
        };
        let query = hashing::perceptual_hash(&image);

        let candidates = match self.store.zrange_withscores(&phash_set_key(namespace)).await {
            Ok(candidates) => candidates,
            Err(e) => {
                debug!("Perceptual tier unavailable, treating as miss: {}", e);
                return None;
            }
        };

        for (candidate_path, _score) in candidates {
            let Some(meta) = self.candidate_meta(&candidate_path).await else {
                continue;
            };
            // The metadata blob is keyed by original path alone, so a later
            // write for a different namespace may have replaced it
            if meta.namespace != namespace {
                continue;
            }
            let Some(stored) = PerceptualHash::from_hex(&meta.phash) else {
                continue;
            };

            let similarity = hashing::similarity(&query, &stored);
            if similarity >= similarity_threshold {
                info!(
                    "Perceptual hash match for {} - similarity {:.2}%",
                    original_path,
                    similarity * 100.0
                );
                return Some(CacheHit {
                    artifact_path: meta.artifact_path,
                    kind: CacheHitKind::Perceptual { similarity },
                });
            }
        }

        None
    }

    async fn candidate_meta(&self, candidate_path: &str) -> Option<CacheEntryMeta> {
        let raw = match self.store.get(&metadata_key(candidate_path)).await {
            Ok(raw) => raw?,
            Err(e) => {
                debug!("Metadata read for {} failed: {}", candidate_path, e);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(meta) => Some(meta),
            Err(e) => {
                debug!("Discarding unparseable metadata for {}: {}", candidate_path, e);
                None
            }
        }
    }

    /// Record a freshly computed artifact in the exact and perceptual tiers
    ///
    /// Best-effort: hash or store failures are logged and swallowed; the
    /// durable version record written by the caller remains authoritative.
    pub async fn record_result(&self, original_path: &str, artifact_path: &str, namespace: &str) {
        let exact = match hashing::exact_hash_file(original_path) {
            Ok(exact) => exact,
            Err(e) => {
                warn!("Skipping cache record for {}: {}", original_path, e);
                return;
            }
        };
        let phash = match image::open(original_path) {
            Ok(image) => hashing::perceptual_hash(&image),
            Err(e) => {
                warn!("Skipping cache record for {}: {}", original_path, e);
                return;
            }
        };

        let meta = CacheEntryMeta {
            original_path: original_path.to_string(),
            artifact_path: artifact_path.to_string(),
            namespace: namespace.to_string(),
            exact_hash: exact.clone(),
            phash: phash.to_hex(),
            cached_at: Utc::now(),
        };

        if let Err(e) = self
            .store
            .set(&exact_hash_key(namespace, &exact), artifact_path)
            .await
        {
            debug!("Exact tier write skipped: {}", e);
        }
        if let Err(e) = self
            .store
            .zadd(&phash_set_key(namespace), original_path, phash.score())
            .await
        {
            debug!("Perceptual tier write skipped: {}", e);
        }
        match serde_json::to_string(&meta) {
            Ok(json) => {
                if let Err(e) = self.store.set(&metadata_key(original_path), &json).await {
                    debug!("Metadata write skipped: {}", e);
                }
            }
            Err(e) => debug!("Metadata serialization skipped: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStore;
    use std::io::Cursor;

    fn red_square_png() -> Vec<u8> {
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            100,
            100,
            image::Rgb([255, 0, 0]),
        ));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[tokio::test]
    async fn lookup_degrades_to_miss_when_store_is_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("red.png");
        std::fs::write(&original, red_square_png()).unwrap();

        let store = CacheStore::new("redis://192.0.2.1:6379", 50).unwrap();
        let service = ImageCacheService::new(store);

        let hit = service
            .find_cached_result(original.to_str().unwrap(), "grayscale", 0.97)
            .await;
        assert!(hit.is_none());
    }

    #[tokio::test]
    async fn lookup_degrades_to_miss_for_unreadable_content() {
        let store = CacheStore::new("redis://192.0.2.1:6379", 50).unwrap();
        let service = ImageCacheService::new(store);

        let hit = service
            .find_cached_result("/nonexistent/missing.png", "grayscale", 0.97)
            .await;
        assert!(hit.is_none());
    }

    #[tokio::test]
    #[ignore] // Requires Redis to be running
    async fn exact_tier_hit_after_record() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("red.png");
        std::fs::write(&original, red_square_png()).unwrap();
        let original_path = original.to_str().unwrap();

        let store = CacheStore::new("redis://127.0.0.1:6379", 500).unwrap();
        store.clear_all().await.unwrap();
        let service = ImageCacheService::new(store);

        service
            .record_result(original_path, "/artifacts/red_gray.png", "grayscale")
            .await;

        let hit = service
            .find_cached_result(original_path, "grayscale", 0.97)
            .await
            .expect("expected exact tier hit");
        assert_eq!(hit.artifact_path, "/artifacts/red_gray.png");
        assert_eq!(hit.kind, CacheHitKind::Exact);

        // A different namespace must not hit
        let miss = service
            .find_cached_result(original_path, "blur:2", 0.97)
            .await;
        assert!(miss.is_none());
    }

    #[tokio::test]
    #[ignore] // Requires Redis to be running
    async fn perceptual_tier_matches_a_reencoded_copy() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("red.png");
        std::fs::write(&original, red_square_png()).unwrap();
        let original_path = original.to_str().unwrap();

        // Byte-different copy of the same visual content
        let copy = dir.path().join("red_copy.jpg");
        image::open(&original)
            .unwrap()
            .save_with_format(&copy, image::ImageFormat::Jpeg)
            .unwrap();

        let store = CacheStore::new("redis://127.0.0.1:6379", 500).unwrap();
        store.clear_all().await.unwrap();
        let service = ImageCacheService::new(store);

        service
            .record_result(original_path, "/artifacts/red_gray.png", "grayscale")
            .await;

        let hit = service
            .find_cached_result(copy.to_str().unwrap(), "grayscale", 0.97)
            .await
            .expect("expected perceptual tier hit");
        assert_eq!(hit.artifact_path, "/artifacts/red_gray.png");
        assert!(matches!(hit.kind, CacheHitKind::Perceptual { similarity } if similarity >= 0.97));

        // Visually unrelated content must not clear the threshold
        let unrelated = dir.path().join("gradient.png");
        let mut gradient = image::RgbImage::new(100, 100);
        for (x, y, pixel) in gradient.enumerate_pixels_mut() {
            *pixel = image::Rgb([(x * 2) as u8, (y * 2) as u8, 128]);
        }
        image::DynamicImage::ImageRgb8(gradient)
            .save_with_format(&unrelated, image::ImageFormat::Png)
            .unwrap();

        let miss = service
            .find_cached_result(unrelated.to_str().unwrap(), "grayscale", 0.97)
            .await;
        assert!(miss.is_none());
    }
}
