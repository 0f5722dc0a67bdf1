//! Sync orchestrator
//!
//! One run fetches the bulk dataset once, then fans out one task per catalog
//! entity and joins on all of them. An entity failing, or even panicking,
//! never cancels its siblings.
//!
//! ```text
//! Idle -> Fetching -> FetchFailed
//!                  -> FanningOut -> Aggregating -> Done
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::{EntityCatalog, EntityOutcome, RunPhase, SyncOutcome};

use super::fetcher::BulkSource;
use super::workflow::EntitySync;

/// Something that performs one complete sync run
#[async_trait]
pub trait Orchestration: Send + Sync {
    /// Run once and report the outcome; never fails
    async fn run(&self) -> SyncOutcome;
}

/// Bulk fetch, fan-out, fan-in
pub struct SyncOrchestrator {
    fetcher: Arc<dyn BulkSource>,
    workflow: Arc<dyn EntitySync>,
    catalog: Arc<EntityCatalog>,
}

impl SyncOrchestrator {
    /// Create an orchestrator over a catalog
    pub fn new(
        fetcher: Arc<dyn BulkSource>,
        workflow: Arc<dyn EntitySync>,
        catalog: Arc<EntityCatalog>,
    ) -> Self {
        Self {
            fetcher,
            workflow,
            catalog,
        }
    }

    /// Entities this orchestrator syncs
    pub fn catalog(&self) -> &EntityCatalog {
        &self.catalog
    }

    /// Run once with the given instance id
    pub async fn run_with_id(&self, run_id: Uuid) -> SyncOutcome {
        let started_at = Utc::now();
        let mut phase = RunPhase::Idle;

        transition(run_id, &mut phase, RunPhase::Fetching);
        let dataset = match self.fetcher.fetch().await {
            Ok(dataset) => Arc::new(dataset),
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "Bulk fetch failed, skipping all entities");
                transition(run_id, &mut phase, RunPhase::FetchFailed);
                return SyncOutcome::fetch_failed(run_id, started_at);
            }
        };

        transition(run_id, &mut phase, RunPhase::FanningOut);
        let handles: Vec<_> = self
            .catalog
            .iter()
            .map(|entity| {
                let workflow = self.workflow.clone();
                let entity = entity.clone();
                let dataset = dataset.clone();
                tokio::spawn(async move { workflow.sync(&entity, &dataset).await })
            })
            .collect();

        let results = join_all(handles).await;

        transition(run_id, &mut phase, RunPhase::Aggregating);
        let entities: Vec<EntityOutcome> = self
            .catalog
            .iter()
            .zip(results)
            .map(|(entity, result)| {
                let ok = result.unwrap_or_else(|e| {
                    error!(
                        run_id = %run_id,
                        entity = %entity.key,
                        error = %e,
                        "Entity workflow task aborted"
                    );
                    false
                });
                EntityOutcome {
                    key: entity.key.clone(),
                    ok,
                }
            })
            .collect();

        transition(run_id, &mut phase, RunPhase::Done);
        let outcome = SyncOutcome::completed(run_id, started_at, entities);

        log_summary(&outcome);
        outcome
    }
}

#[async_trait]
impl Orchestration for SyncOrchestrator {
    async fn run(&self) -> SyncOutcome {
        self.run_with_id(Uuid::new_v4()).await
    }
}

fn log_summary(outcome: &SyncOutcome) {
    let failed = outcome.failed_entities();
    if failed.is_empty() {
        info!(
            run_id = %outcome.run_id,
            entities = outcome.entities.len(),
            succeeded = outcome.succeeded(),
            "Sync run completed"
        );
    } else {
        warn!(
            run_id = %outcome.run_id,
            entities = outcome.entities.len(),
            succeeded = outcome.succeeded(),
            failed = failed.len(),
            failed_entities = ?failed,
            "Sync run completed with failures"
        );
    }
}

fn transition(run_id: Uuid, phase: &mut RunPhase, next: RunPhase) {
    info!(run_id = %run_id, from = %phase, to = %next, "Run phase changed");
    *phase = next;
}
