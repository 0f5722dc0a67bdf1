//! Bulk dataset fetcher
//!
//! Downloads the one bulk dataset document, stages it in a per-run scratch
//! file, parses it, and removes the file whatever the parse outcome.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::models::BulkDataset;

use super::http_client::HttpClient;
use super::scratch::ScratchSpace;

/// Source of the bulk dataset
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BulkSource: Send + Sync {
    /// Fetch and parse the dataset
    async fn fetch(&self) -> Result<BulkDataset, SyncError>;
}

/// Fetches the dataset over HTTP
pub struct HttpBulkFetcher {
    http: Arc<HttpClient>,
    url: String,
    scratch: ScratchSpace,
}

impl HttpBulkFetcher {
    /// Create a fetcher for the dataset at `url`
    pub fn new(http: Arc<HttpClient>, url: impl Into<String>, scratch: ScratchSpace) -> Self {
        Self {
            http,
            url: url.into(),
            scratch,
        }
    }
}

#[async_trait]
impl BulkSource for HttpBulkFetcher {
    async fn fetch(&self) -> Result<BulkDataset, SyncError> {
        let body = self.http.get(&self.url).await?;

        let run_dir = self.scratch.run_dir()?;
        let staging = run_dir.path().join("factbook.json");
        tokio::fs::write(&staging, &body).await?;
        debug!(path = %staging.display(), bytes = body.len(), "Staged bulk dataset");

        let parsed = match tokio::fs::read(&staging).await {
            Ok(bytes) => BulkDataset::from_slice(&bytes),
            Err(e) => Err(e.into()),
        };

        if let Err(e) = tokio::fs::remove_file(&staging).await {
            warn!(path = %staging.display(), error = %e, "Failed to remove staged dataset");
        }
        if let Err(e) = run_dir.close() {
            warn!(error = %e, "Failed to remove run scratch directory");
        }

        let dataset = parsed?;
        info!(url = %self.url, entries = dataset.len(), "Fetched bulk dataset");
        Ok(dataset)
    }
}
