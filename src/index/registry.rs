//! Per-space index registry

use crate::index::config::{IndexBackendKind, IndexConfig};
use crate::index::error::IndexResult;
use crate::index::memory::MemoryIndex;
use crate::index::tantivy_index::TantivyIndex;
use crate::index::{IndexBackend, IndexProvider};
use crate::models::SpaceKey;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Creates and caches one index backend per space
pub struct IndexRegistry {
    config: IndexConfig,
    indexes: DashMap<SpaceKey, Arc<dyn IndexBackend>>,

    /// Serialises partition creation; an on-disk index admits a single writer
    creating: Mutex<()>,
}

impl IndexRegistry {
    pub fn new(config: IndexConfig) -> Self {
        Self {
            config,
            indexes: DashMap::new(),
            creating: Mutex::new(()),
        }
    }

    /// Registry holding every partition in memory
    pub fn in_memory() -> Self {
        Self::new(IndexConfig::default())
    }

    /// Register a prebuilt backend for `key`, replacing any cached one
    pub fn insert(&self, key: SpaceKey, backend: Arc<dyn IndexBackend>) {
        self.indexes.insert(key, backend);
    }

    /// Number of partitions opened so far
    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    fn cached(&self, key: &SpaceKey) -> Option<Arc<dyn IndexBackend>> {
        self.indexes.get(key).map(|entry| entry.value().clone())
    }

    async fn create(&self, key: &SpaceKey) -> IndexResult<Arc<dyn IndexBackend>> {
        let backend: Arc<dyn IndexBackend> = match self.config.backend {
            IndexBackendKind::Memory => Arc::new(MemoryIndex::new()),
            IndexBackendKind::Tantivy => {
                let path = self
                    .config
                    .path
                    .join(&key.storage_id)
                    .join(&key.space_id);
                Arc::new(TantivyIndex::open(&path, self.config.writer_heap_size).await?)
            }
        };

        tracing::info!(space = %key, backend = %self.config.backend, "Index partition created");
        Ok(backend)
    }
}

#[async_trait]
impl IndexProvider for IndexRegistry {
    async fn index_for(&self, key: &SpaceKey) -> IndexResult<Arc<dyn IndexBackend>> {
        if let Some(existing) = self.cached(key) {
            return Ok(existing);
        }

        let _guard = self.creating.lock().await;
        if let Some(existing) = self.cached(key) {
            return Ok(existing);
        }

        let created = self.create(key).await?;
        self.indexes.insert(key.clone(), created.clone());
        Ok(created)
    }
}
