//! Scoped object store sessions
//!
//! [`ObjectStoreClient::open`] hands out an [`ObjectSession`] guard holding a
//! session permit. The permit is released when the guard is dropped, whether
//! the holder returned normally, bailed out with `?`, or panicked.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::error::ObjectStoreError;

use super::traits::ObjectStore;

/// Object store client with a bounded number of open sessions
#[derive(Clone)]
pub struct ObjectStoreClient {
    store: Arc<dyn ObjectStore>,
    sessions: Arc<Semaphore>,
    max_sessions: usize,
}

impl ObjectStoreClient {
    /// Create a client over a backend
    pub fn new(store: Arc<dyn ObjectStore>, max_sessions: usize) -> Self {
        Self {
            store,
            sessions: Arc::new(Semaphore::new(max_sessions)),
            max_sessions,
        }
    }

    /// Open a session, waiting for a free slot
    pub async fn open(&self) -> Result<ObjectSession, ObjectStoreError> {
        let permit = self
            .sessions
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ObjectStoreError::SessionsClosed)?;

        debug!(backend = self.store.name(), "Opened object store session");

        Ok(ObjectSession {
            store: self.store.clone(),
            _permit: permit,
        })
    }

    /// Stop handing out sessions; open ones stay usable until dropped
    pub fn close(&self) {
        self.sessions.close();
    }

    /// Number of sessions currently open
    pub fn open_sessions(&self) -> usize {
        self.max_sessions
            .saturating_sub(self.sessions.available_permits())
    }
}

impl std::fmt::Debug for ObjectStoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreClient")
            .field("backend", &self.store.name())
            .field("max_sessions", &self.max_sessions)
            .finish()
    }
}

/// An open object store session
pub struct ObjectSession {
    store: Arc<dyn ObjectStore>,
    _permit: OwnedSemaphorePermit,
}

impl ObjectSession {
    /// Whether a blob exists in the container
    pub async fn exists(&self, container: &str, name: &str) -> Result<bool, ObjectStoreError> {
        self.store.exists(container, name).await
    }

    /// Upload a local file under its file name
    pub async fn upload(&self, container: &str, local_path: &Path) -> Result<(), ObjectStoreError> {
        self.store.upload(container, local_path).await
    }

    /// Delete a blob
    pub async fn delete(&self, container: &str, name: &str) -> Result<(), ObjectStoreError> {
        self.store.delete(container, name).await
    }

    /// Release the session explicitly
    pub fn close(self) {}
}

impl Drop for ObjectSession {
    fn drop(&mut self) {
        debug!(backend = self.store.name(), "Closed object store session");
    }
}
