use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How an original image entered the system
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Upload,
    Url,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Upload => "upload",
            SourceKind::Url => "url",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "upload" => Some(SourceKind::Upload),
            "url" => Some(SourceKind::Url),
            _ => None,
        }
    }
}

/// Durable record for an ingested image
///
/// Identity is the storage path (unique). Immutable once created except for
/// the version counter and last-access bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginalImage {
    pub id: Uuid,
    /// Stored filename (unique, uuid- or url-hash-derived)
    pub file_name: String,
    /// Client-supplied filename, kept for display/audit
    pub original_file_name: String,
    /// Storage path; the record's natural identity
    pub file_path: String,
    /// Exact (cryptographic) hash of the stored bytes
    pub content_hash: String,
    pub source_kind: SourceKind,
    pub source_url: Option<String>,
    /// Owning user; None for anonymous flows
    pub user_id: Option<Uuid>,
    /// Running count of versions derived from this original
    pub version_count: i64,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: Option<DateTime<Utc>>,
}

/// Fields required to register a new original image
#[derive(Debug, Clone)]
pub struct NewOriginalImage {
    pub file_name: String,
    pub original_file_name: String,
    pub file_path: String,
    pub content_hash: String,
    pub source_kind: SourceKind,
    pub source_url: Option<String>,
    pub user_id: Option<Uuid>,
}

/// Durable record for one transformation result of an original image
///
/// Identity is (original_image_id, param_hash); version numbers are dense
/// and scoped per original, starting at 1. Immutable once created except for
/// deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageVersion {
    pub id: Uuid,
    pub original_image_id: Uuid,
    pub version_number: i64,
    /// Path of the produced artifact
    pub file_path: String,
    /// Canonical JSON of the parameter structure that produced the artifact
    pub operation_params: String,
    /// Hash of the canonical parameter structure; the dedup key
    pub param_hash: String,
    pub user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Fields required to mint a new image version
#[derive(Debug, Clone)]
pub struct NewImageVersion {
    pub original_image_id: Uuid,
    pub file_path: String,
    pub operation_params: String,
    pub param_hash: String,
    pub user_id: Option<Uuid>,
}

/// Metadata blob stored alongside each perceptual-set member
///
/// The sorted-set score alone cannot reconstruct the full descriptor, so the
/// lookup path re-reads this blob per candidate to compute similarity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntryMeta {
    pub original_path: String,
    pub artifact_path: String,
    /// Operation identifier the artifact was produced under
    pub namespace: String,
    pub exact_hash: String,
    /// Hex-encoded perceptual descriptor
    pub phash: String,
    pub cached_at: DateTime<Utc>,
}

/// Which tier satisfied a cache lookup
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CacheHitKind {
    Exact,
    Perceptual { similarity: f64 },
}

/// Successful result of a cache lookup
#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit {
    pub artifact_path: String,
    pub kind: CacheHitKind,
}

/// Result of a pipeline transformation request
#[derive(Debug, Clone)]
pub struct TransformOutcome {
    pub version: ImageVersion,
    /// True when an existing version satisfied the request (no durable insert)
    pub was_cached: bool,
    /// Which volatile tier hit, when the artifact itself was reused
    pub cache_hit: Option<CacheHitKind>,
}

impl TransformOutcome {
    pub fn artifact_path(&self) -> &str {
        &self.version.file_path
    }
}

/// Point-in-time statistics for the volatile cache tiers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub exact_entries: u64,
    pub perceptual_sets: u64,
    pub metadata_entries: u64,
    pub version_entries: u64,
    pub hits_exact: u64,
    pub hits_perceptual: u64,
    pub misses: u64,
    /// hits / (hits + misses); None before any lookup has been counted
    pub hit_ratio: Option<f64>,
    /// Reported by the store when available
    pub used_memory_bytes: Option<u64>,
}

impl CacheStats {
    pub fn total_hits(&self) -> u64 {
        self.hits_exact + self.hits_perceptual
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_kind_string_mapping_is_symmetric() {
        for kind in [SourceKind::Upload, SourceKind::Url] {
            assert_eq!(SourceKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(SourceKind::parse("carrier-pigeon"), None);
    }

    #[test]
    fn image_version_snapshot_round_trips_as_json() {
        let version = ImageVersion {
            id: Uuid::new_v4(),
            original_image_id: Uuid::new_v4(),
            version_number: 3,
            file_path: "processed/red_1a2b3c4d.png".to_string(),
            operation_params: r#"{"ops":[{"op":"grayscale"}]}"#.to_string(),
            param_hash: "abc123".to_string(),
            user_id: None,
            created_at: Utc::now(),
        };

        let json = serde_json::to_string(&version).unwrap();
        let parsed: ImageVersion = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, version.id);
        assert_eq!(parsed.version_number, 3);
        assert_eq!(parsed.param_hash, version.param_hash);
    }
}
