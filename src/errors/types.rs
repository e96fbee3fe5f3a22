//! Error type definitions for the imgcache service
//!
//! The error taxonomy mirrors how failures are allowed to propagate:
//! volatile-cache errors are recoverable and call sites degrade to a miss,
//! hash errors downgrade a lookup path, metadata-store errors are fatal to
//! the call that needed durable persistence, and validation errors are
//! rejected before any store is touched.

use thiserror::Error;

/// Top-level application error type
///
/// Uses `thiserror` to provide automatic error trait implementations and
/// proper error chaining.
#[derive(Error, Debug)]
pub enum AppError {
    /// Durable metadata store errors (fatal for registration/versioning calls)
    #[error("Metadata store error: {0}")]
    Metadata(#[from] sqlx::Error),

    /// Volatile cache store errors (recoverable; callers degrade to a miss)
    #[error("Cache store error: {0}")]
    Cache(#[from] CacheError),

    /// Content/perceptual hashing errors (recoverable; lookup skips the tier)
    #[error("Hash error: {0}")]
    Hash(#[from] HashError),

    /// Invalid transformation parameters, rejected before any store work
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Transform capability or artifact persistence failures
    #[error("Processing error: {message}")]
    Processing { message: String },

    /// Resource not found errors
    #[error("Not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },

    /// Filesystem errors from artifact storage
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client errors from URL ingestion
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Volatile cache store specific errors
///
/// Never fatal on their own: read paths treat them as a cache miss and
/// write paths log and continue, because the durable store remains the
/// source of truth.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Connection or command failures from the underlying store
    #[error("Store command failed: {0}")]
    Store(#[from] redis::RedisError),

    /// Operation exceeded its bounded timeout
    #[error("Store operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Cached payload could not be (de)serialized
    #[error("Cache serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Hash computation specific errors
#[derive(Error, Debug)]
pub enum HashError {
    /// Source bytes could not be read
    #[error("Failed to read content for hashing: {0}")]
    Io(#[from] std::io::Error),

    /// Image bytes could not be decoded for perceptual hashing
    #[error("Failed to decode image for hashing: {0}")]
    Decode(#[from] image::ImageError),

    /// Parameter structure could not be serialized canonically
    #[error("Failed to canonicalize parameters: {0}")]
    Canonicalize(#[from] serde_json::Error),
}

/// Convenience methods for creating common error types
impl AppError {
    /// Create a validation error naming the offending parameter
    pub fn validation<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a processing error
    pub fn processing<M: Into<String>>(message: M) -> Self {
        Self::Processing {
            message: message.into(),
        }
    }

    /// Create a not found error for a specific resource
    pub fn not_found<R: Into<String>, I: Into<String>>(resource: R, id: I) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    /// Create an internal error
    pub fn internal<M: Into<String>>(message: M) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error should surface as a client error rather than a
    /// server error (validation vs processing, per the error contract)
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_name_the_offending_field() {
        let err = AppError::validation("resize.width", "must be positive");
        assert!(err.to_string().contains("resize.width"));
        assert!(err.is_client_error());
    }

    #[test]
    fn processing_errors_are_server_errors() {
        let err = AppError::processing("encode failed");
        assert!(!err.is_client_error());
    }

    #[test]
    fn cache_errors_surface_as_server_errors() {
        let err = AppError::from(CacheError::Timeout { timeout_ms: 50 });
        assert!(!err.is_client_error());
        assert!(err.to_string().contains("timed out after 50ms"));
    }
}
