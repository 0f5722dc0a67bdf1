//! factbook-sync - Periodic World Factbook synchronization
//!
//! This is the main entry point for the factbook-sync application.

use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};

use factbook_sync::app::{build_orchestrator, load_catalog};
use factbook_sync::config::Config;
use factbook_sync::logging::init_tracing;
use factbook_sync::sync::{Orchestration, SyncScheduler};

/// factbook-sync - Periodic World Factbook synchronization
#[derive(Parser, Debug)]
#[command(name = "factbook-sync")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "FACTBOOK_SYNC_CONFIG")]
    config: Option<String>,

    /// Path to the entity catalog, overrides `catalog_path`
    #[arg(long)]
    catalog: Option<String>,

    /// Run a single sync, print the outcome as JSON and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration
    let config = load_config(&args)?;

    // Initialize tracing/logging
    init_tracing(&config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting factbook-sync"
    );

    let catalog = load_catalog(&config, args.catalog.as_deref())?;
    let orchestrator = build_orchestrator(&config, catalog).await?;

    if args.once {
        let outcome = orchestrator.run().await;
        println!("{}", serde_json::to_string_pretty(&outcome)?);

        if !outcome.is_complete_success() {
            error!(
                run_id = %outcome.run_id,
                failed = ?outcome.failed_entities(),
                "Sync run did not fully succeed"
            );
            std::process::exit(1);
        }
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let scheduler = SyncScheduler::new(config.schedule.clone(), Arc::new(orchestrator), shutdown_rx);
    let scheduler_handle = tokio::spawn(scheduler.run());

    shutdown_signal().await;
    // Scheduler may already have stopped
    let _ = shutdown_tx.send(());

    if let Err(e) = scheduler_handle.await {
        error!(error = %e, "Sync scheduler task failed");
    }

    info!("factbook-sync shutdown complete");
    Ok(())
}

/// Load configuration from file or environment
fn load_config(args: &Args) -> anyhow::Result<Config> {
    match &args.config {
        Some(path) => {
            // Use eprintln! since tracing is not yet initialized
            eprintln!("Loading configuration from file: {}", path);
            Config::from_file(path).map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
        None => {
            // Use eprintln! since tracing is not yet initialized
            eprintln!("Loading configuration from environment variables");
            Config::from_env().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
    }
}

/// Create a future that resolves when a shutdown signal is received
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
