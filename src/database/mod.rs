//! Record store layer for factbook-sync
//!
//! This module defines the partitioned record store trait, its SQLite
//! implementation, and the retrying client the sync workflow uses.

pub mod client;
pub mod migrations;
pub mod sqlite;

pub use client::RecordStoreClient;
pub use sqlite::SqliteRecordStore;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;
use crate::models::StoredRecord;

/// Partitioned document store
///
/// Documents live in a collection and are grouped by partition key. The
/// store rate-limits per partition and signals it with
/// [`StoreError::RateLimited`] or [`StoreError::ServiceUnavailable`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// All documents of a partition whose `name` field equals the partition key
    async fn query_partition(
        &self,
        collection: &str,
        partition_key: &str,
    ) -> Result<Vec<StoredRecord>, StoreError>;

    /// Delete one document by its self link
    ///
    /// Returns [`StoreError::NotFound`] if the document does not exist.
    async fn delete(&self, self_link: &str, partition_key: &str) -> Result<(), StoreError>;

    /// Insert a new document under the partition key
    ///
    /// The body's string `id` member is used as document id when present,
    /// otherwise the store generates one. An existing id is a
    /// [`StoreError::Conflict`].
    async fn insert(
        &self,
        collection: &str,
        partition_key: &str,
        body: &Value,
    ) -> Result<StoredRecord, StoreError>;
}
