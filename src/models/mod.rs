//! Domain models for factbook-sync
//!
//! This module contains the core domain models used throughout the application.

pub mod dataset;
pub mod entity;
pub mod outcome;
pub mod record;

// Re-export commonly used types
pub use dataset::BulkDataset;
pub use entity::{CatalogError, Entity, EntityCatalog};
pub use outcome::{ArtifactKind, EntityOutcome, RunPhase, SyncOutcome, SyncStep};
pub use record::StoredRecord;
