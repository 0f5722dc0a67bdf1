//! Tracing subscriber setup

use crate::config::LoggingConfig;
use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Logging initialization errors
#[derive(Debug, Error)]
pub enum LoggingError {
    /// A global subscriber is already installed
    #[error("Failed to initialize tracing: {0}")]
    Init(String),

    /// Unknown output format
    #[error("Unknown log format: {0}")]
    Format(String),
}

/// Parse a log level name, defaulting to `info`
pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize the global tracing subscriber
///
/// `format` is `json` for one JSON object per line, or `pretty` for
/// human-readable multi-line output.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = LevelFilter::from_level(parse_level(&config.level));

    match config.format.to_lowercase().as_str() {
        "json" => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| LoggingError::Init(e.to_string())),
        "pretty" => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()
            .map_err(|e| LoggingError::Init(e.to_string())),
        other => Err(LoggingError::Format(other.to_string())),
    }
}
