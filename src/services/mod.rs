//! Service layer
//!
//! Each service owns the store handles it needs and exposes the operations
//! the integrator shell wires up: ingestion of originals, race-safe version
//! get-or-create, and the fixed-order transformation pipeline.

pub mod ingest;
pub mod pipeline;
pub mod versioning;

pub use ingest::IngestService;
pub use pipeline::TransformPipeline;
pub use versioning::VersioningService;
