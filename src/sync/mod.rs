//! The synchronization pipeline
//!
//! One bulk fetch feeds a fan-out of per-entity workflows. Each workflow is
//! idempotent, absorbs backend rate limiting through a bounded retry, and can
//! fail without aborting its siblings.
//!
//! # Components
//!
//! - [`retry`]: Bounded retry driven by the [`RetryableError`](crate::error::RetryableError) predicate
//! - [`http_client`]: Rate-limited HTTP client for the dataset and image sources
//! - [`fetcher`]: Bulk dataset download and parse
//! - [`workflow`]: The per-entity six-step pipeline
//! - [`orchestrator`]: Fetch once, fan out, fan in
//! - [`scheduler`]: Periodic and on-demand runs
//! - [`scratch`]: Per-run and per-entity scratch directories
//!
//! # Example
//!
//! ```ignore
//! use factbook_sync::sync::{HttpBulkFetcher, SyncOrchestrator, Orchestration};
//!
//! let orchestrator = SyncOrchestrator::new(fetcher, workflow, catalog);
//! let outcome = orchestrator.run().await;
//!
//! for entity in outcome.failed_entities() {
//!     eprintln!("{} failed", entity);
//! }
//! ```

pub mod fetcher;
pub mod http_client;
pub mod orchestrator;
pub mod retry;
pub mod scheduler;
pub mod scratch;
pub mod workflow;

// Re-export main types for convenience
pub use fetcher::{BulkSource, HttpBulkFetcher};
pub use http_client::HttpClient;
pub use orchestrator::{Orchestration, SyncOrchestrator};
pub use retry::RetryPolicy;
pub use scheduler::{RunNowHandle, SchedulerStatus, SyncScheduler};
pub use scratch::ScratchSpace;
pub use workflow::{EntitySync, EntitySyncWorkflow, ImageSources};
