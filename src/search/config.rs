//! Search aggregation configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Aggregator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Budget for one space's backend query, in milliseconds
    #[serde(default = "default_per_space_timeout_ms")]
    pub per_space_timeout_ms: u64,

    /// Maximum number of spaces queried at the same time
    #[serde(default = "default_max_concurrent_spaces")]
    pub max_concurrent_spaces: usize,

    /// Per-space result cap when the request has no page size; 0 disables the cap
    #[serde(default = "default_max_results_per_space")]
    pub max_results_per_space: usize,
}

fn default_per_space_timeout_ms() -> u64 {
    5_000
}

fn default_max_concurrent_spaces() -> usize {
    16
}

fn default_max_results_per_space() -> usize {
    1_000
}

impl SearchConfig {
    pub fn per_space_timeout(&self) -> Duration {
        Duration::from_millis(self.per_space_timeout_ms)
    }

    /// Backend limit for a request with the given effective page size
    pub fn backend_limit(&self, page_size: Option<usize>) -> Option<usize> {
        page_size.or_else(|| Some(self.max_results_per_space).filter(|max| *max > 0))
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            per_space_timeout_ms: default_per_space_timeout_ms(),
            max_concurrent_spaces: default_max_concurrent_spaces(),
            max_results_per_space: default_max_results_per_space(),
        }
    }
}

/// Builder for SearchConfig
pub struct SearchConfigBuilder {
    config: SearchConfig,
}

impl SearchConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SearchConfig::default(),
        }
    }

    pub fn per_space_timeout(mut self, timeout: Duration) -> Self {
        self.config.per_space_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn max_concurrent_spaces(mut self, max: usize) -> Self {
        self.config.max_concurrent_spaces = max;
        self
    }

    pub fn max_results_per_space(mut self, max: usize) -> Self {
        self.config.max_results_per_space = max;
        self
    }

    pub fn build(self) -> SearchConfig {
        self.config
    }
}

impl Default for SearchConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
