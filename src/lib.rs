//! imgcache - content-addressed image transformation cache
//!
//! A two-tier deduplication and versioning layer for image transformation
//! results: a fast volatile cache (exact and perceptual hash lookups, version
//! mirrors with TTL) over a durable metadata store that remains the source of
//! truth. The pixel transforms themselves are delegated to a backend behind
//! the [`transform::TransformBackend`] trait.

pub mod cache;
pub mod config;
pub mod database;
pub mod errors;
pub mod hashing;
pub mod models;
pub mod params;
pub mod services;
pub mod storage;
pub mod transform;

pub use errors::{AppError, CacheError, HashError};
