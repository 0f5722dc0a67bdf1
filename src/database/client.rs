//! Retrying record store client
//!
//! Every backend call goes through the shared [`RetryPolicy`], so transient
//! rate-limit and unavailability signals are absorbed locally while any other
//! error is returned on the first occurrence.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use super::RecordStore;
use crate::error::StoreError;
use crate::models::StoredRecord;
use crate::sync::retry::RetryPolicy;

/// Record store client bound to one collection
#[derive(Clone)]
pub struct RecordStoreClient {
    store: Arc<dyn RecordStore>,
    collection: String,
    retry: RetryPolicy,
}

impl RecordStoreClient {
    /// Create a client for `collection`
    pub fn new(store: Arc<dyn RecordStore>, collection: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            store,
            collection: collection.into(),
            retry,
        }
    }

    /// Documents currently stored in a partition
    pub async fn query_partition(&self, partition_key: &str) -> Result<Vec<StoredRecord>, StoreError> {
        self.retry
            .execute(|| self.store.query_partition(&self.collection, partition_key))
            .await
    }

    /// Remove every document of a partition
    ///
    /// An empty partition is success. A document that vanished between the
    /// query and its delete counts as deleted. Returns the number of
    /// documents removed.
    pub async fn delete_partition(&self, partition_key: &str) -> Result<usize, StoreError> {
        let records = self.query_partition(partition_key).await?;
        let mut deleted = 0;

        for record in &records {
            let result = self
                .retry
                .execute(|| self.store.delete(&record.self_link, partition_key))
                .await;

            match result {
                Ok(()) => deleted += 1,
                Err(StoreError::NotFound(_)) => {
                    debug!(
                        partition = partition_key,
                        self_link = %record.self_link,
                        "Record already gone"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        if deleted > 0 {
            info!(
                collection = %self.collection,
                partition = partition_key,
                deleted = deleted,
                "Deleted prior records"
            );
        }
        Ok(deleted)
    }

    /// Insert a new document under the partition key
    ///
    /// Conflicts are returned as errors; no update is attempted.
    pub async fn insert(&self, partition_key: &str, body: &Value) -> Result<StoredRecord, StoreError> {
        let record = self
            .retry
            .execute(|| self.store.insert(&self.collection, partition_key, body))
            .await?;

        debug!(
            collection = %self.collection,
            partition = partition_key,
            id = %record.id,
            "Inserted record"
        );
        Ok(record)
    }
}

impl std::fmt::Debug for RecordStoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStoreClient")
            .field("collection", &self.collection)
            .field("retry", &self.retry)
            .finish()
    }
}
