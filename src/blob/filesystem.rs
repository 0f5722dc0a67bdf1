//! Filesystem-based object store
//!
//! Each container is a directory under the base path and each blob a file in
//! it. Uploads are staged next to the target and renamed into place, so a
//! reader never observes a half-written blob.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ObjectStoreError;

use super::traits::{blob_name_of, validate_name, ObjectStore};

/// Filesystem-based object store implementation
#[derive(Debug, Clone)]
pub struct FilesystemObjectStore {
    base_path: PathBuf,
}

impl FilesystemObjectStore {
    /// Creates a new FilesystemObjectStore rooted at `base_path`
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Creates the store and its base directory
    pub async fn new_with_init(base_path: impl Into<PathBuf>) -> Result<Self, ObjectStoreError> {
        let store = Self::new(base_path);
        fs::create_dir_all(&store.base_path).await?;
        Ok(store)
    }

    /// Returns the base path for blob storage
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn container_path(&self, container: &str) -> Result<PathBuf, ObjectStoreError> {
        validate_name(container)?;
        Ok(self.base_path.join(container))
    }

    /// Path of a blob on disk
    pub fn blob_path(&self, container: &str, name: &str) -> Result<PathBuf, ObjectStoreError> {
        validate_name(name)?;
        Ok(self.container_path(container)?.join(name))
    }
}

#[async_trait]
impl ObjectStore for FilesystemObjectStore {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn exists(&self, container: &str, name: &str) -> Result<bool, ObjectStoreError> {
        let path = self.blob_path(container, name)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn upload(&self, container: &str, local_path: &Path) -> Result<(), ObjectStoreError> {
        let name = blob_name_of(local_path)?;
        let target = self.blob_path(container, name)?;
        let container_dir = self.container_path(container)?;

        fs::create_dir_all(&container_dir).await?;

        let staging = container_dir.join(format!(".{}.{}.tmp", name, Uuid::new_v4()));
        if let Err(e) = fs::copy(local_path, &staging).await {
            // The staging file may exist partially written
            let _ = fs::remove_file(&staging).await;
            return Err(e.into());
        }

        if let Err(e) = fs::rename(&staging, &target).await {
            if let Err(cleanup) = fs::remove_file(&staging).await {
                warn!(path = %staging.display(), error = %cleanup, "Failed to remove staging file");
            }
            return Err(e.into());
        }

        debug!(container = container, blob = name, "Uploaded blob");
        Ok(())
    }

    async fn delete(&self, container: &str, name: &str) -> Result<(), ObjectStoreError> {
        let path = self.blob_path(container, name)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(container = container, blob = name, "Deleted blob");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
