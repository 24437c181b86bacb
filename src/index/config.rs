//! Index backend configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use strum::{Display, EnumString};

/// Which backend the registry creates for a new space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IndexBackendKind {
    #[default]
    Memory,
    Tantivy,
}

/// Index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Backend used for every space partition
    #[serde(default)]
    pub backend: IndexBackendKind,

    /// Base directory for on-disk indexes; each space gets `<path>/<storage>/<space>`
    #[serde(default = "default_index_path")]
    pub path: PathBuf,

    /// Index writer heap size in bytes (default: 50MB)
    #[serde(default = "default_writer_heap_size")]
    pub writer_heap_size: usize,
}

fn default_index_path() -> PathBuf {
    PathBuf::from("./data/index")
}

fn default_writer_heap_size() -> usize {
    50_000_000
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: IndexBackendKind::default(),
            path: default_index_path(),
            writer_heap_size: default_writer_heap_size(),
        }
    }
}

/// Builder for IndexConfig
pub struct IndexConfigBuilder {
    config: IndexConfig,
}

impl IndexConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: IndexConfig::default(),
        }
    }

    pub fn backend(mut self, backend: IndexBackendKind) -> Self {
        self.config.backend = backend;
        self
    }

    pub fn path(mut self, path: PathBuf) -> Self {
        self.config.path = path;
        self
    }

    pub fn writer_heap_size(mut self, size: usize) -> Self {
        self.config.writer_heap_size = size;
        self
    }

    pub fn build(self) -> IndexConfig {
        self.config
    }
}

impl Default for IndexConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
