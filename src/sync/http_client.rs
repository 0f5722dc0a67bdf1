//! Rate-limited HTTP client for the dataset and image sources
//!
//! This module provides an HTTP client with a global concurrency cap and a
//! per-host minimum request interval. Every non-success status is mapped into
//! a [`SyncError`].

use crate::config::HttpConfig;
use crate::error::SyncError;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, warn};

/// Shared GET client for the dataset and image sources
///
/// At most `max_concurrent` requests are in flight. Requests to one host are
/// started at least `min_interval_ms` apart.
#[derive(Debug)]
pub struct HttpClient {
    client: Client,
    in_flight: Arc<Semaphore>,
    next_slot: Arc<Mutex<HashMap<String, Instant>>>,
    config: HttpConfig,
}

impl HttpClient {
    /// Build a client from configuration
    pub fn new(config: HttpConfig) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("factbook-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Network(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self::with_client(client, config))
    }

    /// Wrap an existing reqwest client
    pub fn with_client(client: Client, config: HttpConfig) -> Self {
        Self {
            client,
            in_flight: Arc::new(Semaphore::new(config.max_concurrent)),
            next_slot: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    /// Fetch `url` and return the whole body
    pub async fn get(&self, url: &str) -> Result<Bytes, SyncError> {
        let _permit = self
            .in_flight
            .acquire()
            .await
            .map_err(|_| SyncError::Network("HTTP client closed".to_string()))?;

        self.pace(url).await;
        debug!(url = url, "GET");

        let response = self.client.get(url).send().await.map_err(map_reqwest_error)?;
        let status = response.status();

        if status.is_success() {
            let body = response.bytes().await.map_err(map_reqwest_error)?;
            debug!(url = url, bytes = body.len(), "Downloaded");
            return Ok(body);
        }

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        let err = self.status_error(status, retry_after);
        match err {
            SyncError::NotFound => debug!(url = url, "Not found"),
            _ => warn!(url = url, status = status.as_u16(), error = %err, "Request rejected"),
        }
        Err(err)
    }

    fn status_error(&self, status: StatusCode, retry_after: Option<u64>) -> SyncError {
        match status {
            StatusCode::TOO_MANY_REQUESTS => {
                SyncError::RateLimited(retry_after.unwrap_or(self.config.rate_limit_wait_secs))
            }
            StatusCode::NOT_FOUND => SyncError::NotFound,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SyncError::Unauthorized,
            other => SyncError::ServerError(other.as_u16()),
        }
    }

    /// Reserve the next request slot for the URL's host and sleep until it
    async fn pace(&self, url: &str) {
        if self.config.min_interval_ms == 0 {
            return;
        }
        let spacing = Duration::from_millis(self.config.min_interval_ms);
        let host = extract_host(url);

        let start_at = {
            let mut slots = self.next_slot.lock().await;
            let now = Instant::now();
            let start_at = slots.get(&host).copied().filter(|t| *t > now).unwrap_or(now);
            slots.insert(host.clone(), start_at + spacing);
            start_at
        };

        let wait = start_at.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            debug!(host = %host, wait_ms = wait.as_millis() as u64, "Pacing request");
            tokio::time::sleep(wait).await;
        }
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    /// Free request slots
    pub fn available_permits(&self) -> usize {
        self.in_flight.available_permits()
    }
}

fn map_reqwest_error(e: reqwest::Error) -> SyncError {
    if e.is_timeout() {
        SyncError::NetworkTimeout
    } else if e.is_connect() {
        SyncError::ConnectionRefused
    } else {
        SyncError::Network(e.to_string())
    }
}

/// Host (with port) of a URL
fn extract_host(url: &str) -> String {
    match url.split_once("://") {
        Some((_, rest)) => rest.split('/').next().unwrap_or(rest).to_string(),
        None => url.to_string(),
    }
}
