//! Ingestion and event configuration

use serde::{Deserialize, Serialize};

/// Ingestion pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Download and index text content, not only metadata
    #[serde(default = "default_true")]
    pub extract_content: bool,

    /// Upper bound of content read per file
    #[serde(default = "default_max_content_bytes")]
    pub max_content_bytes: usize,

    /// Skip resources whose indexed mtime and path are current
    #[serde(default = "default_true")]
    pub skip_unchanged: bool,

    /// Documents written to the index per batch during a walk
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            extract_content: true,
            max_content_bytes: default_max_content_bytes(),
            skip_unchanged: true,
            batch_size: default_batch_size(),
        }
    }
}

/// Lifecycle event intake configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Run the event consumer
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Bound of the in-process event channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// NATS server; the broker bridge is only started when set
    #[serde(default)]
    pub nats_url: Option<String>,

    /// Subject carrying lifecycle events
    #[serde(default = "default_subject")]
    pub subject: String,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channel_capacity: default_channel_capacity(),
            nats_url: None,
            subject: default_subject(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_content_bytes() -> usize {
    1_048_576
}

fn default_batch_size() -> usize {
    256
}

fn default_channel_capacity() -> usize {
    1_024
}

fn default_subject() -> String {
    "space-search.events".to_string()
}
