use crate::index::IndexConfig;
use crate::ingestion::{EventsConfig, IngestionConfig};
use crate::search::SearchConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Fan-out limits of the aggregator
    #[serde(default)]
    pub search: SearchConfig,

    /// Index backend selection
    #[serde(default)]
    pub index: IndexConfig,

    /// Storage gateway configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Document ingestion
    #[serde(default)]
    pub ingestion: IngestionConfig,

    /// Lifecycle event bus
    #[serde(default)]
    pub events: EventsConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path = std::env::var("SPACE_SEARCH_CONFIG")
            .unwrap_or_else(|_| "config/default.toml".to_string());

        config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(&config_path).required(false))
            // Override with environment variables (prefix: SPACE_SEARCH__)
            .add_source(
                config::Environment::with_prefix("SPACE_SEARCH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Upper bound for any single HTTP request (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON fixture describing users, spaces and trees served by the
    /// in-process gateway; empty storage when unset
    #[serde(default)]
    pub fixture_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Expose Prometheus metrics on /metrics
    #[serde(default = "default_true")]
    pub prometheus_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            prometheus_enabled: true,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    9115
}

fn default_request_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}
