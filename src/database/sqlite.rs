//! SQLite implementation of the RecordStore trait
//!
//! This module provides a SQLite-based partitioned record store using
//! rusqlite and tokio-rusqlite for async operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio_rusqlite::Connection;
use uuid::Uuid;

use super::migrations::CREATE_SCHEMA;
use super::RecordStore;
use crate::error::StoreError;
use crate::models::record::{parse_self_link, self_link};
use crate::models::StoredRecord;

/// SQLite record store implementation
pub struct SqliteRecordStore {
    conn: Connection,
}

impl SqliteRecordStore {
    /// Open a SQLite record store
    ///
    /// Use `:memory:` for in-memory database or a file path for persistent storage.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path).await?;

        conn.call(|conn| {
            conn.busy_timeout(std::time::Duration::from_secs(5))?;
            conn.execute_batch(CREATE_SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    /// Create a new in-memory database (useful for testing)
    pub async fn in_memory() -> Result<Self, StoreError> {
        Self::new(":memory:").await
    }

    /// Number of documents in a collection
    pub async fn count(&self, collection: &str) -> Result<u64, StoreError> {
        let collection = collection.to_string();

        self.conn
            .call(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM records WHERE collection = ?1",
                    [&collection],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Into::into)
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn query_partition(
        &self,
        collection: &str,
        partition_key: &str,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        let collection = collection.to_string();
        let partition_key = partition_key.to_string();

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT id, body, created_at
                    FROM records
                    WHERE collection = ?1 AND partition_key = ?2 AND name = ?2
                    ORDER BY created_at, id
                    "#,
                )?;

                let records = stmt
                    .query_map(rusqlite::params![collection, partition_key], |row| {
                        let id: String = row.get(0)?;
                        let body: String = row.get(1)?;
                        let body: Value = serde_json::from_str(&body).map_err(|e| {
                            rusqlite::Error::FromSqlConversionFailure(
                                1,
                                rusqlite::types::Type::Text,
                                Box::new(e),
                            )
                        })?;

                        Ok(StoredRecord {
                            self_link: self_link(&collection, &id),
                            id,
                            partition_key: partition_key.clone(),
                            body,
                            created_at: parse_datetime(&row.get::<_, String>(2)?),
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                Ok(records)
            })
            .await
            .map_err(Into::into)
    }

    async fn delete(&self, link: &str, partition_key: &str) -> Result<(), StoreError> {
        let (collection, id) = parse_self_link(link)
            .ok_or_else(|| StoreError::InvalidRecord(format!("Malformed self link: {}", link)))?;
        let collection = collection.to_string();
        let id = id.to_string();
        let partition_key = partition_key.to_string();

        let deleted = self
            .conn
            .call(move |conn| {
                let deleted = conn.execute(
                    "DELETE FROM records WHERE collection = ?1 AND partition_key = ?2 AND id = ?3",
                    rusqlite::params![collection, partition_key, id],
                )?;
                Ok(deleted)
            })
            .await?;

        if deleted == 0 {
            return Err(StoreError::NotFound(link.to_string()));
        }
        Ok(())
    }

    async fn insert(
        &self,
        collection: &str,
        partition_key: &str,
        body: &Value,
    ) -> Result<StoredRecord, StoreError> {
        let id = body
            .get("id")
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let encoded =
            serde_json::to_string(body).map_err(|e| StoreError::InvalidRecord(e.to_string()))?;
        let created_at = Utc::now();

        let record = StoredRecord {
            id: id.clone(),
            self_link: self_link(collection, &id),
            partition_key: partition_key.to_string(),
            body: body.clone(),
            created_at,
        };

        let collection = collection.to_string();
        let partition_key = partition_key.to_string();

        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO records (collection, partition_key, id, name, body, created_at)
                    VALUES (?1, ?2, ?3, ?2, ?4, ?5)
                    "#,
                    rusqlite::params![
                        collection,
                        partition_key,
                        id,
                        encoded,
                        created_at.to_rfc3339()
                    ],
                )?;
                Ok(())
            })
            .await?;

        Ok(record)
    }
}

/// Parse a stored timestamp, falling back to the epoch
fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}
