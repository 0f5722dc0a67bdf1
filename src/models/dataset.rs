//! Bulk dataset model
//!
//! The factbook document is shaped as
//! `{ "countries": { <key>: { "data": <fragment> } } }`. Only the per-key
//! `data` fragments are kept; their contents stay opaque.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use crate::error::SyncError;

/// In-memory lookup from entity key to its JSON fragment
///
/// Built once per run and shared read-only between workflows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkDataset {
    fragments: HashMap<String, Value>,
}

impl BulkDataset {
    /// Parse the raw dataset document
    pub fn from_slice(bytes: &[u8]) -> Result<Self, SyncError> {
        let root: Value = serde_json::from_slice(bytes)
            .map_err(|e| SyncError::InvalidData(format!("Dataset is not valid JSON: {}", e)))?;
        Self::from_document(root)
    }

    /// Extract the fragments from an already parsed document
    pub fn from_document(root: Value) -> Result<Self, SyncError> {
        let countries = match root {
            Value::Object(mut map) => map.remove("countries"),
            _ => None,
        };

        let countries = match countries {
            Some(Value::Object(countries)) => countries,
            _ => {
                return Err(SyncError::InvalidData(
                    "Dataset has no \"countries\" object".to_string(),
                ))
            }
        };

        let mut fragments = HashMap::with_capacity(countries.len());
        for (key, entry) in countries {
            match entry {
                Value::Object(mut entry) => match entry.remove("data") {
                    Some(data) => {
                        fragments.insert(key, data);
                    }
                    None => debug!(key = key, "Dataset entry has no data member"),
                },
                _ => debug!(key = key, "Dataset entry is not an object"),
            }
        }

        Ok(Self { fragments })
    }

    /// Build a dataset directly from fragments
    pub fn from_fragments<I, K>(fragments: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            fragments: fragments.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Fragment for an entity key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fragments.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fragments.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_factbook_shape() {
        let doc = json!({
            "countries": {
                "france": { "data": { "name": "France", "area": 643801 } },
                "world": { "data": { "name": "World" } }
            },
            "metadata": { "date": "2020-01-01" }
        });

        let dataset = BulkDataset::from_slice(doc.to_string().as_bytes()).unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.get("france").unwrap()["area"], json!(643801));
        assert!(dataset.contains("world"));
        assert!(dataset.get("spain").is_none());
    }

    #[test]
    fn test_entries_without_data_are_skipped() {
        let doc = json!({
            "countries": {
                "france": { "data": { "name": "France" } },
                "broken": { "nodata": true },
                "scalar": 7
            }
        });

        let dataset = BulkDataset::from_document(doc).unwrap();

        assert_eq!(dataset.len(), 1);
        assert!(!dataset.contains("broken"));
        assert!(!dataset.contains("scalar"));
    }

    #[test]
    fn test_missing_countries_is_invalid() {
        let result = BulkDataset::from_document(json!({ "nations": {} }));
        assert!(matches!(result, Err(SyncError::InvalidData(_))));

        let result = BulkDataset::from_document(json!([1, 2, 3]));
        assert!(matches!(result, Err(SyncError::InvalidData(_))));
    }

    #[test]
    fn test_invalid_json_is_invalid_data() {
        let result = BulkDataset::from_slice(b"{ not json");
        match result {
            Err(SyncError::InvalidData(msg)) => assert!(msg.contains("not valid JSON")),
            other => panic!("Expected InvalidData, got {:?}", other),
        }
    }

    #[test]
    fn test_from_fragments() {
        let dataset = BulkDataset::from_fragments([("france", json!({ "name": "France" }))]);
        assert_eq!(dataset.get("france"), Some(&json!({ "name": "France" })));
    }
}
