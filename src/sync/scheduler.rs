//! Sync scheduler for periodic and on-demand runs
//!
//! This module provides a scheduler that triggers one orchestration run on
//! startup, then on a fixed interval with optional jitter. A [`RunNowHandle`]
//! starts an immediate run and waits for its outcome. Manual and periodic
//! runs are executed by the same loop, so two runs never overlap.

use crate::config::ScheduleConfig;
use crate::error::SchedulerError;
use crate::models::SyncOutcome;
use chrono::{DateTime, Utc};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};

use super::orchestrator::Orchestration;

/// Status of the scheduler
#[derive(Debug, Clone, Default)]
pub struct SchedulerStatus {
    /// When the last run finished
    pub last_run: Option<DateTime<Utc>>,
    /// Outcome of the last run
    pub last_outcome: Option<SyncOutcome>,
    /// Estimated start of the next periodic run
    pub next_run: Option<DateTime<Utc>>,
    /// Whether a run is currently in progress
    pub in_progress: bool,
    /// Number of runs performed
    pub runs: u64,
}

/// Manual run request
struct RunNowRequest {
    response: oneshot::Sender<SyncOutcome>,
}

/// Sync scheduler
///
/// Drives a single orchestration on a timer and on demand.
pub struct SyncScheduler {
    config: ScheduleConfig,
    orchestration: Arc<dyn Orchestration>,
    status: Arc<RwLock<SchedulerStatus>>,
    shutdown_rx: broadcast::Receiver<()>,
    run_now_rx: mpsc::Receiver<RunNowRequest>,
    run_now_tx: mpsc::Sender<RunNowRequest>,
}

impl SyncScheduler {
    /// Create a new sync scheduler
    ///
    /// # Arguments
    ///
    /// * `config` - Interval, initial delay and jitter
    /// * `orchestration` - The run to perform
    /// * `shutdown_rx` - Broadcast receiver for shutdown signal
    pub fn new(
        config: ScheduleConfig,
        orchestration: Arc<dyn Orchestration>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        let (run_now_tx, run_now_rx) = mpsc::channel(8);

        Self {
            config,
            orchestration,
            status: Arc::new(RwLock::new(SchedulerStatus::default())),
            shutdown_rx,
            run_now_rx,
            run_now_tx,
        }
    }

    /// Get a handle for triggering immediate runs
    pub fn run_now_handle(&self) -> RunNowHandle {
        RunNowHandle {
            tx: self.run_now_tx.clone(),
        }
    }

    /// Get a shared view of the scheduler status
    pub fn status_handle(&self) -> Arc<RwLock<SchedulerStatus>> {
        self.status.clone()
    }

    /// Get the current scheduler status
    pub async fn get_status(&self) -> SchedulerStatus {
        self.status.read().await.clone()
    }

    /// Run the scheduler until shutdown is signaled
    pub async fn run(mut self) {
        let interval = Duration::from_secs(self.config.interval_secs);
        info!(
            interval_secs = self.config.interval_secs,
            "Starting sync scheduler"
        );

        if self.config.initial_delay_secs > 0 {
            debug!(
                delay_secs = self.config.initial_delay_secs,
                "Waiting for initial delay"
            );
            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    info!("Shutdown signal received before first run");
                    return;
                }
                _ = tokio::time::sleep(Duration::from_secs(self.config.initial_delay_secs)) => {}
            }
        }

        info!("Performing initial sync");
        self.perform_run().await;

        let mut timer = interval_at(Instant::now() + interval, interval);
        self.set_next_run(interval).await;

        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping sync scheduler");
                    break;
                }
                Some(request) = self.run_now_rx.recv() => {
                    info!("Manual sync triggered");
                    let outcome = self.perform_run().await;
                    if request.response.send(outcome).is_err() {
                        debug!("Manual sync requester went away");
                    }
                }
                _ = timer.tick() => {
                    let jitter = jitter_secs(self.config.jitter_secs);
                    if jitter > 0 {
                        debug!(jitter_secs = jitter, "Delaying scheduled sync");
                        tokio::select! {
                            _ = self.shutdown_rx.recv() => {
                                info!("Shutdown signal received during jitter delay");
                                break;
                            }
                            _ = tokio::time::sleep(Duration::from_secs(jitter)) => {}
                        }
                    }

                    info!("Performing scheduled sync");
                    self.perform_run().await;
                    self.set_next_run(interval).await;
                }
            }
        }

        info!("Sync scheduler stopped");
    }

    async fn perform_run(&self) -> SyncOutcome {
        self.status.write().await.in_progress = true;

        let outcome = self.orchestration.run().await;

        if outcome.is_complete_success() {
            info!(run_id = %outcome.run_id, "Sync run succeeded");
        } else {
            warn!(
                run_id = %outcome.run_id,
                fetched = outcome.fetched,
                failed = outcome.failed_entities().len(),
                "Sync run finished with failures"
            );
        }

        let mut status = self.status.write().await;
        status.in_progress = false;
        status.last_run = Some(outcome.finished_at);
        status.last_outcome = Some(outcome.clone());
        status.runs += 1;

        outcome
    }

    async fn set_next_run(&self, interval: Duration) {
        let next = chrono::Duration::from_std(interval)
            .ok()
            .map(|d| Utc::now() + d);
        self.status.write().await.next_run = next;
    }
}

fn jitter_secs(max: u64) -> u64 {
    if max > 0 {
        rand::thread_rng().gen_range(0..max)
    } else {
        0
    }
}

/// Handle for triggering immediate runs
#[derive(Clone)]
pub struct RunNowHandle {
    tx: mpsc::Sender<RunNowRequest>,
}

impl RunNowHandle {
    /// Start a run now and wait for its outcome
    ///
    /// If a run is in progress, this run starts right after it.
    pub async fn run_now(&self) -> Result<SyncOutcome, SchedulerError> {
        let (response_tx, response_rx) = oneshot::channel();

        self.tx
            .send(RunNowRequest {
                response: response_tx,
            })
            .await
            .map_err(|_| SchedulerError::NotRunning)?;

        response_rx.await.map_err(|_| SchedulerError::NoResponse)
    }
}
