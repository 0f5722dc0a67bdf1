//! Record store document model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One persisted document in the partitioned record store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Store-generated document id
    pub id: String,

    /// Handle used to delete this exact document
    pub self_link: String,

    /// Partition the document lives in (entity display name)
    pub partition_key: String,

    /// Document content (the entity's dataset fragment)
    pub body: Value,

    /// When the document was inserted
    pub created_at: DateTime<Utc>,
}

/// Build the self link of a document
pub fn self_link(collection: &str, id: &str) -> String {
    format!("colls/{}/docs/{}", collection, id)
}

/// Split a self link into `(collection, id)`
///
/// The id is everything after the first `/docs/`, so ids taken from
/// dataset fragments may contain `/`.
pub fn parse_self_link(link: &str) -> Option<(&str, &str)> {
    let rest = link.strip_prefix("colls/")?;
    let (collection, id) = rest.split_once("/docs/")?;
    if collection.is_empty() || collection.contains('/') || id.is_empty() {
        return None;
    }
    Some((collection, id))
}
