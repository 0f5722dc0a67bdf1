//! Application error types for factbook-sync
//!
//! This module defines the error types shared by the sync pipeline.
//! All error types use `thiserror` for ergonomic error handling.

use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;
use crate::models::{CatalogError, SyncStep};

/// Errors from HTTP sources (bulk dataset and image endpoints)
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SyncError {
    /// Network timeout
    #[error("Network timeout")]
    NetworkTimeout,

    /// Connection refused
    #[error("Connection refused")]
    ConnectionRefused,

    /// Rate limited by upstream
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Server error
    #[error("Server error: HTTP {0}")]
    ServerError(u16),

    /// Invalid data received
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Resource not found
    #[error("Resource not found")]
    NotFound,

    /// Unauthorized
    #[error("Unauthorized")]
    Unauthorized,

    /// Generic network error
    #[error("Network error: {0}")]
    Network(String),

    /// Local staging file could not be written or read
    #[error("Local I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Io(err.to_string())
    }
}

/// Errors returned by a partitioned record store
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    /// The backend asked the caller to slow down (HTTP 429)
    #[error("Request rate too large")]
    RateLimited {
        /// Backend-suggested wait before retrying
        retry_after: Option<Duration>,
    },

    /// The backend is temporarily unavailable (HTTP 503, database busy)
    #[error("Service unavailable")]
    ServiceUnavailable {
        /// Backend-suggested wait before retrying
        retry_after: Option<Duration>,
    },

    /// A record with the same identity already exists
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The addressed record does not exist
    #[error("Record not found: {0}")]
    NotFound(String),

    /// The record body could not be encoded or decoded
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Any other backend failure
    #[error("Backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// HTTP-equivalent status code of this error class
    pub fn status_code(&self) -> u16 {
        match self {
            StoreError::RateLimited { .. } => 429,
            StoreError::ServiceUnavailable { .. } => 503,
            StoreError::Conflict(_) => 409,
            StoreError::NotFound(_) => 404,
            StoreError::InvalidRecord(_) => 400,
            StoreError::Backend(_) => 500,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match &err {
            rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                    StoreError::ServiceUnavailable { retry_after: None }
                }
                ErrorCode::ConstraintViolation => StoreError::Conflict(err.to_string()),
                _ => StoreError::Backend(err.to_string()),
            },
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(err.to_string()),
            _ => StoreError::Backend(err.to_string()),
        }
    }
}

impl From<tokio_rusqlite::Error> for StoreError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        match err {
            tokio_rusqlite::Error::Rusqlite(e) => e.into(),
            tokio_rusqlite::Error::ConnectionClosed => {
                StoreError::ServiceUnavailable { retry_after: None }
            }
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// Object store errors
#[derive(Debug, Error)]
pub enum ObjectStoreError {
    /// IO error during a blob operation
    #[error("Object store IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Blob or container name cannot be used as a path component
    #[error("Invalid blob name: {0}")]
    InvalidName(String),

    /// Blob does not exist
    #[error("Blob not found: {0}")]
    NotFound(String),

    /// The client no longer hands out sessions
    #[error("Object store sessions closed")]
    SessionsClosed,
}

/// Failure of one step of a per-entity sync
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Entity key missing from the bulk dataset
    #[error("Entity {0} not found in dataset")]
    MissingData(String),

    /// Fragment present but unusable
    #[error("Invalid fragment for {key}: {reason}")]
    InvalidFragment {
        /// Entity key
        key: String,
        /// What was wrong with it
        reason: String,
    },

    /// Scratch space could not be created or written
    #[error("{step} scratch error: {source}")]
    Scratch {
        /// Failing step
        step: SyncStep,
        /// Underlying error
        source: std::io::Error,
    },

    /// Object store operation failed
    #[error("{step} failed: {source}")]
    ObjectStore {
        /// Failing step
        step: SyncStep,
        /// Underlying error
        source: ObjectStoreError,
    },

    /// Record store operation failed (after retries)
    #[error("{step} failed: {source}")]
    RecordStore {
        /// Failing step
        step: SyncStep,
        /// Underlying error
        source: StoreError,
    },

    /// Remote resource could not be fetched
    #[error("{step} failed: {source}")]
    Fetch {
        /// Failing step
        step: SyncStep,
        /// Underlying error
        source: SyncError,
    },
}

impl WorkflowError {
    /// The step at which the workflow stopped
    pub fn step(&self) -> SyncStep {
        match self {
            WorkflowError::MissingData(_) | WorkflowError::InvalidFragment { .. } => {
                SyncStep::Extract
            }
            WorkflowError::Scratch { step, .. }
            | WorkflowError::ObjectStore { step, .. }
            | WorkflowError::RecordStore { step, .. }
            | WorkflowError::Fetch { step, .. } => *step,
        }
    }
}

/// Errors from the run-now handle
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SchedulerError {
    /// The scheduler loop has stopped
    #[error("Scheduler is not running")]
    NotRunning,

    /// The scheduler dropped the request without answering
    #[error("Scheduler dropped the run request")]
    NoResponse,
}

/// Application-level error type
///
/// Used while wiring the binary together. The sync pipeline itself never
/// returns it; pipeline failures become boolean outcomes.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Entity catalog error
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Record store error
    #[error("Record store error: {0}")]
    Store(#[from] StoreError),

    /// Object store error
    #[error("Object store error: {0}")]
    ObjectStore(#[from] ObjectStoreError),

    /// Sync error
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// Local I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for determining if an error is retryable
pub trait RetryableError {
    /// Returns true if the error is retryable
    fn is_retryable(&self) -> bool;

    /// Wait suggested by the backend before the next attempt
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl RetryableError for SyncError {
    fn is_retryable(&self) -> bool {
        match self {
            // Retryable errors
            SyncError::NetworkTimeout => true,
            SyncError::ConnectionRefused => true,
            SyncError::RateLimited(_) => true,
            SyncError::ServerError(code) if *code >= 500 => true,
            SyncError::Network(_) => true,

            // Non-retryable errors
            SyncError::InvalidData(_) => false,
            SyncError::NotFound => false,
            SyncError::Unauthorized => false,
            SyncError::ServerError(_) => false, // 4xx errors
            SyncError::Io(_) => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            SyncError::RateLimited(secs) => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

impl RetryableError for StoreError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::RateLimited { .. } | StoreError::ServiceUnavailable { .. }
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            StoreError::RateLimited { retry_after } | StoreError::ServiceUnavailable { retry_after } => {
                *retry_after
            }
            _ => None,
        }
    }
}
