//! Object store trait
//!
//! Blobs are addressed by container name plus blob name. Names are never
//! content-addressed, so uploading an existing name overwrites it.

use std::path::Path;

use async_trait::async_trait;

use crate::error::ObjectStoreError;

/// Trait for object store backends
///
/// Backends carry no retry logic; callers see failures immediately.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Returns the name of this backend
    fn name(&self) -> &str;

    /// Whether a blob exists in the container
    async fn exists(&self, container: &str, name: &str) -> Result<bool, ObjectStoreError>;

    /// Uploads a local file, using its file name as the blob name
    ///
    /// An existing blob with the same name is replaced.
    async fn upload(&self, container: &str, local_path: &Path) -> Result<(), ObjectStoreError>;

    /// Deletes a blob
    ///
    /// Returns `Ok(())` even if the blob doesn't exist.
    async fn delete(&self, container: &str, name: &str) -> Result<(), ObjectStoreError>;
}

/// Blob name of a local file
pub fn blob_name_of(local_path: &Path) -> Result<&str, ObjectStoreError> {
    local_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ObjectStoreError::InvalidName(local_path.display().to_string()))
}

/// Reject names that are not a single plain path component
pub fn validate_name(name: &str) -> Result<(), ObjectStoreError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.chars().any(char::is_control);

    if invalid {
        Err(ObjectStoreError::InvalidName(name.to_string()))
    } else {
        Ok(())
    }
}
