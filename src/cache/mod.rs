//! Volatile cache store
//!
//! Thin contract over a shared Redis instance. Every operation carries a
//! bounded timeout; callers on read paths treat any failure as a cache miss
//! and callers on write paths log and continue, because the durable metadata
//! store remains the source of truth. Construction performs no I/O, so an
//! unreachable store degrades per-call instead of failing boot.

pub mod lookup;

use std::future::Future;
use std::time::Duration;

use redis::AsyncCommands;
use tracing::debug;
use uuid::Uuid;

use crate::errors::CacheError;
use crate::models::CacheStats;

pub use lookup::ImageCacheService;

/// Key prefixes partitioning the volatile keyspace by concern
pub const EXACT_HASH_PREFIX: &str = "exact_hash:";
pub const PHASH_PREFIX: &str = "phash:";
pub const METADATA_PREFIX: &str = "img_meta:";
pub const VERSION_PREFIX: &str = "version:";
pub const VERSION_PARAMS_PREFIX: &str = "version_params:";
pub const STATS_PREFIX: &str = "stats:";

pub const STATS_HITS_EXACT: &str = "stats:hits:exact";
pub const STATS_HITS_PERCEPTUAL: &str = "stats:hits:perceptual";
pub const STATS_MISSES: &str = "stats:misses";

#[derive(Clone)]
pub struct CacheStore {
    client: redis::Client,
    op_timeout: Duration,
}

impl CacheStore {
    pub fn new(url: &str, op_timeout_ms: u64) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        Ok(Self {
            client,
            op_timeout: Duration::from_millis(op_timeout_ms),
        })
    }

    /// Run a store operation under the bounded timeout
    async fn bounded<T, F>(&self, fut: F) -> Result<T, CacheError>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(CacheError::Timeout {
                timeout_ms: self.op_timeout.as_millis() as u64,
            }),
        }
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, CacheError> {
        self.bounded(self.client.get_multiplexed_async_connection())
            .await
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection().await?;
        self.bounded(conn.get(key)).await
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        self.bounded(conn.set(key, value)).await
    }

    pub async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl_secs: u64,
    ) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        self.bounded(conn.set_ex(key, value, ttl_secs)).await
    }

    pub async fn zadd(&self, set_key: &str, member: &str, score: f64) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        self.bounded(conn.zadd(set_key, member, score)).await
    }

    /// Full contents of a sorted set, ascending by score
    pub async fn zrange_withscores(
        &self,
        set_key: &str,
    ) -> Result<Vec<(String, f64)>, CacheError> {
        let mut conn = self.connection().await?;
        self.bounded(conn.zrange_withscores(set_key, 0, -1)).await
    }

    /// Remove one exact key; unlike [`delete_by_prefix`](Self::delete_by_prefix)
    /// this never touches keys that merely share a prefix
    pub async fn del(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        self.bounded(conn.del(key)).await
    }

    pub async fn incr(&self, counter_key: &str) -> Result<i64, CacheError> {
        let mut conn = self.connection().await?;
        self.bounded(conn.incr(counter_key, 1)).await
    }

    /// Best-effort counter increment for hit/miss bookkeeping
    pub async fn incr_counter(&self, counter_key: &str) {
        if let Err(e) = self.incr(counter_key).await {
            debug!("Counter increment for {} skipped: {}", counter_key, e);
        }
    }

    async fn counter_value(&self, counter_key: &str) -> u64 {
        match self.get(counter_key).await {
            Ok(Some(value)) => value.parse().unwrap_or(0),
            _ => 0,
        }
    }

    /// Delete every key under a prefix via cursor scans; returns keys removed
    pub async fn delete_by_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        let mut conn = self.connection().await?;
        let pattern = format!("{}*", prefix);
        let mut cursor: u64 = 0;
        let mut deleted: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = self
                .bounded(
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(&pattern)
                        .arg("COUNT")
                        .arg(100)
                        .query_async(&mut conn),
                )
                .await?;

            if !keys.is_empty() {
                let removed: u64 = self.bounded(conn.del(&keys)).await?;
                deleted += removed;
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        Ok(deleted)
    }

    /// Count keys under a prefix via cursor scans
    pub async fn count_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        let mut conn = self.connection().await?;
        let pattern = format!("{}*", prefix);
        let mut cursor: u64 = 0;
        let mut count: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = self
                .bounded(
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(&pattern)
                        .arg("COUNT")
                        .arg(100)
                        .query_async(&mut conn),
                )
                .await?;

            count += keys.len() as u64;
            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        Ok(count)
    }

    /// Memory used by the store, when it reports one
    pub async fn used_memory(&self) -> Option<u64> {
        let mut conn = self.connection().await.ok()?;
        let info: String = self
            .bounded(redis::cmd("INFO").arg("memory").query_async(&mut conn))
            .await
            .ok()?;

        info.lines()
            .find_map(|line| line.strip_prefix("used_memory:"))
            .and_then(|value| value.trim().parse().ok())
    }

    /// Point-in-time statistics across the cache tiers
    pub async fn stats(&self) -> Result<CacheStats, CacheError> {
        let hits_exact = self.counter_value(STATS_HITS_EXACT).await;
        let hits_perceptual = self.counter_value(STATS_HITS_PERCEPTUAL).await;
        let misses = self.counter_value(STATS_MISSES).await;
        let lookups = hits_exact + hits_perceptual + misses;

        Ok(CacheStats {
            exact_entries: self.count_prefix(EXACT_HASH_PREFIX).await?,
            perceptual_sets: self.count_prefix(PHASH_PREFIX).await?,
            metadata_entries: self.count_prefix(METADATA_PREFIX).await?,
            version_entries: self.count_prefix(VERSION_PREFIX).await?,
            hits_exact,
            hits_perceptual,
            misses,
            hit_ratio: (lookups > 0)
                .then(|| (hits_exact + hits_perceptual) as f64 / lookups as f64),
            used_memory_bytes: self.used_memory().await,
        })
    }

    /// Wipe every cache tier; the durable store is untouched
    pub async fn clear_all(&self) -> Result<u64, CacheError> {
        let mut deleted = 0;
        for prefix in [
            EXACT_HASH_PREFIX,
            PHASH_PREFIX,
            METADATA_PREFIX,
            VERSION_PREFIX,
            VERSION_PARAMS_PREFIX,
            STATS_PREFIX,
        ] {
            deleted += self.delete_by_prefix(prefix).await?;
        }
        Ok(deleted)
    }

    /// Drop version mirrors, either for one original or globally
    pub async fn clear_versions(&self, original_id: Option<Uuid>) -> Result<u64, CacheError> {
        let (version_prefix, params_prefix) = match original_id {
            Some(id) => (
                format!("{}{}:", VERSION_PREFIX, id),
                format!("{}{}:", VERSION_PARAMS_PREFIX, id),
            ),
            None => (VERSION_PREFIX.to_string(), VERSION_PARAMS_PREFIX.to_string()),
        };

        let mut deleted = self.delete_by_prefix(&version_prefix).await?;
        deleted += self.delete_by_prefix(&params_prefix).await?;
        Ok(deleted)
    }
}

/// Exact-hash tier key for one operation namespace
pub fn exact_hash_key(namespace: &str, exact_hash: &str) -> String {
    format!("{}{}:{}", EXACT_HASH_PREFIX, namespace, exact_hash)
}

/// Per-namespace perceptual sorted-set key
pub fn phash_set_key(namespace: &str) -> String {
    format!("{}{}", PHASH_PREFIX, namespace)
}

/// Metadata blob key for one original image
pub fn metadata_key(original_path: &str) -> String {
    format!("{}{}", METADATA_PREFIX, original_path)
}

/// Version mirror key by version number
pub fn version_key(original_id: Uuid, version_number: i64) -> String {
    format!("{}{}:{}", VERSION_PREFIX, original_id, version_number)
}

/// Version mirror key by parameter hash
pub fn version_params_key(original_id: Uuid, param_hash: &str) -> String {
    format!("{}{}:{}", VERSION_PARAMS_PREFIX, original_id, param_hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_prefixes_do_not_collide() {
        let prefixes = [
            EXACT_HASH_PREFIX,
            PHASH_PREFIX,
            METADATA_PREFIX,
            VERSION_PREFIX,
            VERSION_PARAMS_PREFIX,
            STATS_PREFIX,
        ];
        for (i, a) in prefixes.iter().enumerate() {
            for (j, b) in prefixes.iter().enumerate() {
                if i != j {
                    assert!(!a.starts_with(b), "{} collides with {}", a, b);
                }
            }
        }
    }

    #[test]
    fn key_builders_partition_by_namespace() {
        let id = Uuid::new_v4();
        assert_eq!(
            exact_hash_key("grayscale", "abc"),
            "exact_hash:grayscale:abc"
        );
        assert_eq!(phash_set_key("blur:2"), "phash:blur:2");
        assert_eq!(version_key(id, 3), format!("version:{}:3", id));
        assert_eq!(
            version_params_key(id, "deadbeef"),
            format!("version_params:{}:deadbeef", id)
        );
    }

    #[tokio::test]
    async fn unreachable_store_times_out_instead_of_hanging() {
        // Reserved TEST-NET address; nothing listens there
        let store = CacheStore::new("redis://192.0.2.1:6379", 50).unwrap();
        let started = std::time::Instant::now();
        let result = store.get("exact_hash:grayscale:abc").await;
        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    #[ignore] // Requires Redis to be running
    async fn del_leaves_keys_sharing_a_prefix_alone() {
        let store = CacheStore::new("redis://127.0.0.1:6379", 500).unwrap();
        let id = Uuid::new_v4();
        let short = version_key(id, 1);
        let long = version_key(id, 10);
        store.set(&short, "v1").await.unwrap();
        store.set(&long, "v10").await.unwrap();

        // Version 1's mirror goes, version 10's (same key prefix) stays
        store.del(&short).await.unwrap();
        assert_eq!(store.get(&short).await.unwrap(), None);
        assert_eq!(store.get(&long).await.unwrap(), Some("v10".to_string()));

        store
            .delete_by_prefix(&format!("{}{}:", VERSION_PREFIX, id))
            .await
            .unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Redis to be running
    async fn sorted_set_round_trip() {
        let store = CacheStore::new("redis://127.0.0.1:6379", 500).unwrap();
        let set_key = "phash:test:sorted-set-round-trip";
        store.delete_by_prefix(set_key).await.unwrap();

        store.zadd(set_key, "a.png", 17.0).await.unwrap();
        store.zadd(set_key, "b.png", 3.0).await.unwrap();

        let members = store.zrange_withscores(set_key).await.unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].0, "b.png");

        store.delete_by_prefix(set_key).await.unwrap();
    }
}
