//! Entity and catalog models
//!
//! An entity is one synchronization unit (a country). The catalog is the
//! static, validated list of entities loaded once at process start.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One synchronization unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Dataset key, also the stem of every blob name for this entity
    pub key: String,

    /// Human-readable name, used as the record store partition key
    pub display_name: String,

    /// Identifier of the entity's flag and map images
    pub resource_code: String,
}

impl Entity {
    /// Create a new entity
    pub fn new(
        key: impl Into<String>,
        display_name: impl Into<String>,
        resource_code: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            display_name: display_name.into(),
            resource_code: resource_code.into(),
        }
    }

    /// Partition key of this entity's record
    pub fn partition_key(&self) -> &str {
        &self.display_name
    }
}

/// Catalog errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CatalogError {
    /// Error reading the catalog file
    #[error("Failed to read catalog: {0}")]
    Read(String),

    /// Error parsing the catalog
    #[error("Failed to parse catalog: {0}")]
    Parse(String),

    /// Catalog has no entities
    #[error("Catalog is empty")]
    Empty,

    /// Two entities share a key
    #[error("Duplicate entity key: {0}")]
    DuplicateKey(String),

    /// Key cannot be used as a blob name stem
    #[error("Invalid entity key: {0:?}")]
    InvalidKey(String),

    /// A required field is blank
    #[error("Entity {key} has an empty {field}")]
    EmptyField {
        /// Entity key
        key: String,
        /// Field name
        field: &'static str,
    },
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    entities: Vec<Entity>,
}

/// Static list of entities to synchronize, in run order
#[derive(Debug, Clone)]
pub struct EntityCatalog {
    entities: Vec<Arc<Entity>>,
}

impl EntityCatalog {
    /// Build a validated catalog
    pub fn new(entities: Vec<Entity>) -> Result<Self, CatalogError> {
        if entities.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut seen = HashSet::new();
        for entity in &entities {
            validate_key(&entity.key)?;
            if entity.display_name.trim().is_empty() {
                return Err(CatalogError::EmptyField {
                    key: entity.key.clone(),
                    field: "display_name",
                });
            }
            if entity.resource_code.trim().is_empty() {
                return Err(CatalogError::EmptyField {
                    key: entity.key.clone(),
                    field: "resource_code",
                });
            }
            if !seen.insert(entity.key.as_str()) {
                return Err(CatalogError::DuplicateKey(entity.key.clone()));
            }
        }

        Ok(Self {
            entities: entities.into_iter().map(Arc::new).collect(),
        })
    }

    /// Load a catalog from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| CatalogError::Read(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::from_yaml(&content)
    }

    /// Parse a catalog from YAML of the form `entities: [{key, display_name, resource_code}]`
    pub fn from_yaml(yaml: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile =
            serde_yaml::from_str(yaml).map_err(|e| CatalogError::Parse(e.to_string()))?;
        Self::new(file.entities)
    }

    /// Entities in catalog order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Entity>> {
        self.entities.iter()
    }

    /// Look up an entity by key
    pub fn get(&self, key: &str) -> Option<&Arc<Entity>> {
        self.entities.iter().find(|e| e.key == key)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

fn validate_key(key: &str) -> Result<(), CatalogError> {
    let unsafe_key = key.trim().is_empty()
        || key != key.trim()
        || key.starts_with('.')
        || key.contains(['/', '\\'])
        || key.chars().any(char::is_control);

    if unsafe_key {
        Err(CatalogError::InvalidKey(key.to_string()))
    } else {
        Ok(())
    }
}
