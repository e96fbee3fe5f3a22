//! Content and parameter hashing
//!
//! Three hash families with distinct jobs:
//! - the exact hash (SHA-256 of raw bytes) catches byte-identical
//!   resubmissions and is brittle to re-encodes by design;
//! - the perceptual hash (64-bit DCT descriptor) survives re-encodes and
//!   resizes of the same visual content, so near-duplicates land within a
//!   small Hamming distance of each other;
//! - the parameter hash (SHA-256 of the canonical JSON form of a request)
//!   keys version deduplication and must be identical for semantically equal
//!   requests regardless of construction order.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use image::DynamicImage;
use image_hasher::{HashAlg, HasherConfig};
use sha2::{Digest, Sha256};

use crate::errors::HashError;
use crate::params::TransformRequest;

/// Total bits in the perceptual descriptor
pub const PHASH_BITS: u32 = 64;

/// Exact (cryptographic) hash of raw content, hex-encoded
pub fn exact_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Exact hash of a file's current bytes, streamed
///
/// I/O errors propagate as [`HashError`]; lookup callers treat that as "no
/// exact hash available" and skip the exact tier.
pub fn exact_hash_file(path: impl AsRef<Path>) -> Result<String, HashError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 65536];
    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Fixed-length frequency-domain fingerprint of an image
///
/// Wraps the 64-bit descriptor with the representations the cache needs: hex
/// for metadata blobs, a numeric score for the sorted-set tier, and Hamming
/// distance for similarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerceptualHash(u64);

impl PerceptualHash {
    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub fn to_hex(&self) -> String {
        format!("{:016x}", self.0)
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        u64::from_str_radix(hex, 16).ok().map(Self)
    }

    /// Score for the sorted-set tier (lossy above 2^53, which only affects
    /// iteration order, never the post-hoc similarity check)
    pub fn score(&self) -> f64 {
        self.0 as f64
    }

    pub fn distance(&self, other: &PerceptualHash) -> u32 {
        (self.0 ^ other.0).count_ones()
    }
}

/// Compute the perceptual descriptor of a decoded image
///
/// 8x8 mean hash over the DCT low-frequency block, i.e. the classic pHash
/// construction: stable across re-encodes and moderate resizes of the same
/// visual content.
pub fn perceptual_hash(image: &DynamicImage) -> PerceptualHash {
    let hasher = HasherConfig::new()
        .hash_alg(HashAlg::Mean)
        .preproc_dct()
        .hash_size(8, 8)
        .to_hasher();

    let hash = hasher.hash_image(image);
    let mut bits = [0u8; 8];
    for (slot, byte) in bits.iter_mut().zip(hash.as_bytes()) {
        *slot = *byte;
    }
    PerceptualHash(u64::from_be_bytes(bits))
}

/// Normalized similarity between two descriptors: `1 - hamming/64`
///
/// Symmetric, reflexive (self-similarity is 1.0); no triangle inequality.
pub fn similarity(a: &PerceptualHash, b: &PerceptualHash) -> f64 {
    1.0 - (a.distance(b) as f64 / PHASH_BITS as f64)
}

/// Stable hash of a transformation request, hex-encoded
///
/// The request is canonicalized (fixed operation order) and serialized
/// through a JSON value, whose object keys are sorted, so two semantically
/// equal requests hash identically no matter how they were constructed.
pub fn param_hash(request: &TransformRequest) -> Result<String, HashError> {
    Ok(exact_hash(canonical_params_json(request)?.as_bytes()))
}

/// The canonical JSON form of a request: what versions persist verbatim and
/// what the parameter hash is computed over
pub fn canonical_params_json(request: &TransformRequest) -> Result<String, HashError> {
    let value = serde_json::to_value(request.canonicalize())?;
    Ok(serde_json::to_string(&value)?)
}
