//! Configuration management for factbook-sync
//!
//! This module handles loading, parsing, and validating application configuration
//! from YAML files and environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Remote data sources
    #[serde(default)]
    pub source: SourceConfig,

    /// HTTP client configuration
    #[serde(default)]
    pub http: HttpConfig,

    /// Retry configuration for record store calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Object store configuration
    #[serde(default)]
    pub object_store: ObjectStoreConfig,

    /// Record store configuration
    #[serde(default)]
    pub record_store: RecordStoreConfig,

    /// Periodic trigger configuration
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Directory for transient per-run files (system temp dir if unset)
    #[serde(default)]
    pub scratch_dir: Option<String>,

    /// Entity catalog file
    #[serde(default)]
    pub catalog_path: Option<String>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(yaml);
        let config: Config = serde_yaml::from_str(&expanded)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables with prefix FACTBOOK_SYNC_
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Ok(url) = std::env::var("FACTBOOK_SYNC_DATASET_URL") {
            config.source.dataset_url = url;
        }
        if let Ok(path) = std::env::var("FACTBOOK_SYNC_OBJECT_STORE_PATH") {
            config.object_store.base_path = path;
        }
        if let Ok(container) = std::env::var("FACTBOOK_SYNC_CONTAINER") {
            config.object_store.container = container;
        }
        if let Ok(path) = std::env::var("FACTBOOK_SYNC_RECORD_STORE_PATH") {
            config.record_store.path = path;
        }
        if let Ok(interval) = std::env::var("FACTBOOK_SYNC_INTERVAL_SECS") {
            config.schedule.interval_secs = interval
                .parse()
                .map_err(|_| ConfigError::Parse("Invalid sync interval".to_string()))?;
        }
        if let Ok(path) = std::env::var("FACTBOOK_SYNC_CATALOG") {
            config.catalog_path = Some(path);
        }
        if let Ok(level) = std::env::var("FACTBOOK_SYNC_LOG_LEVEL") {
            config.logging.level = level;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.http.max_concurrent == 0 {
            return Err(ConfigError::InvalidValue(
                "http.max_concurrent must be at least 1".to_string(),
            ));
        }
        if self.object_store.max_sessions == 0 {
            return Err(ConfigError::InvalidValue(
                "object_store.max_sessions must be at least 1".to_string(),
            ));
        }
        if self.schedule.interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "schedule.interval_secs must be positive".to_string(),
            ));
        }
        for (field, template) in [
            ("source.flag_url_template", &self.source.flag_url_template),
            ("source.map_url_template", &self.source.map_url_template),
        ] {
            if !template.contains(CODE_PLACEHOLDER) {
                return Err(ConfigError::InvalidValue(format!(
                    "{} must contain {}",
                    field, CODE_PLACEHOLDER
                )));
            }
        }
        Ok(())
    }
}

/// Placeholder substituted with the uppercased resource code in image URLs
pub const CODE_PLACEHOLDER: &str = "{code}";

/// Remote data source locations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceConfig {
    /// Bulk dataset URL
    #[serde(default = "default_dataset_url")]
    pub dataset_url: String,

    /// Flag image URL, `{code}` is replaced by the resource code
    #[serde(default = "default_flag_url_template")]
    pub flag_url_template: String,

    /// Map image URL, `{code}` is replaced by the resource code
    #[serde(default = "default_map_url_template")]
    pub map_url_template: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            dataset_url: default_dataset_url(),
            flag_url_template: default_flag_url_template(),
            map_url_template: default_map_url_template(),
        }
    }
}

fn default_dataset_url() -> String {
    "https://github.com/iancoleman/cia_world_factbook_api/raw/master/data/factbook.json"
        .to_string()
}

fn default_flag_url_template() -> String {
    "https://www.cia.gov/library/publications/resources/the-world-factbook/attachments/flags/{code}-flag.gif".to_string()
}

fn default_map_url_template() -> String {
    "https://www.cia.gov/library/publications/resources/the-world-factbook/attachments/maps/{code}-map.gif".to_string()
}

/// HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpConfig {
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Minimum interval between requests to one host in milliseconds
    #[serde(default = "default_min_interval")]
    pub min_interval_ms: u64,

    /// Maximum number of concurrent requests
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Wait reported when a 429 carries no Retry-After (in seconds)
    #[serde(default = "default_rate_limit_wait")]
    pub rate_limit_wait_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            min_interval_ms: default_min_interval(),
            max_concurrent: default_max_concurrent(),
            rate_limit_wait_secs: default_rate_limit_wait(),
        }
    }
}

fn default_timeout() -> u64 {
    60
}

fn default_min_interval() -> u64 {
    0
}

fn default_max_concurrent() -> usize {
    8
}

fn default_rate_limit_wait() -> u64 {
    60
}

/// Retry configuration for rate-limited backend calls
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay used when the backend gives no retry hint (milliseconds)
    #[serde(default = "default_fallback_delay")]
    pub fallback_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            fallback_delay_ms: default_fallback_delay(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_fallback_delay() -> u64 {
    1000
}

/// Object store configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObjectStoreConfig {
    /// Root directory of the filesystem object store
    #[serde(default = "default_object_store_path")]
    pub base_path: String,

    /// Container receiving all artifacts
    #[serde(default = "default_container")]
    pub container: String,

    /// Maximum number of concurrently open sessions
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            base_path: default_object_store_path(),
            container: default_container(),
            max_sessions: default_max_sessions(),
        }
    }
}

fn default_object_store_path() -> String {
    "/data/blobs".to_string()
}

fn default_container() -> String {
    "data".to_string()
}

fn default_max_sessions() -> usize {
    8
}

/// Record store configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordStoreConfig {
    /// Path to SQLite database file
    #[serde(default = "default_record_store_path")]
    pub path: String,

    /// Collection holding one record per entity
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for RecordStoreConfig {
    fn default() -> Self {
        Self {
            path: default_record_store_path(),
            collection: default_collection(),
        }
    }
}

fn default_record_store_path() -> String {
    "/data/db/factbook.db".to_string()
}

fn default_collection() -> String {
    "Country".to_string()
}

/// Periodic trigger configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleConfig {
    /// Interval between runs in seconds
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Delay before the first run in seconds
    #[serde(default)]
    pub initial_delay_secs: u64,

    /// Random delay added to each periodic run, upper bound in seconds
    #[serde(default)]
    pub jitter_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            initial_delay_secs: 0,
            jitter_secs: 0,
        }
    }
}

fn default_interval() -> u64 {
    3600 // 1 hour
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (`json` or `pretty`)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Configuration error types
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Error reading configuration file
    #[error("Failed to read configuration file: {0}")]
    FileRead(String),

    /// Error parsing configuration
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// Invalid configuration value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Expand environment variables in a string
///
/// Supports `${VAR_NAME}` syntax
fn expand_env_vars(input: &str) -> String {
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}")
        .expect("Invalid regex pattern for environment variable expansion");

    re.replace_all(input, |caps: &regex_lite::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}
