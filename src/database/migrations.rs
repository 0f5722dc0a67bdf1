//! Database migrations for the record store
//!
//! This module contains SQL migrations for the SQLite database schema.

/// SQL statement to create the record store schema
///
/// One row per document. `name` mirrors the partition key and is the field
/// partition queries filter on.
pub const CREATE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    collection TEXT NOT NULL,
    partition_key TEXT NOT NULL,
    id TEXT NOT NULL,
    name TEXT NOT NULL,
    body TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (collection, partition_key, id)
);

CREATE INDEX IF NOT EXISTS idx_records_partition_name
    ON records(collection, partition_key, name);
"#;
