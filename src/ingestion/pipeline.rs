//! Ingestion pipeline: keeps each space's index in step with storage

use crate::index::{IndexBackend, IndexProvider};
use crate::ingestion::config::IngestionConfig;
use crate::ingestion::error::{IngestError, IngestResult};
use crate::ingestion::events::LifecycleEvent;
use crate::ingestion::extractor::Extractor;
use crate::metrics::SEARCH_METRICS;
use crate::models::{Document, DocumentBody, ResourceId, SpaceId, SpaceKey, UserId};
use crate::storage::{AuthToken, ResourceInfo, StorageError, StorageGateway};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Counters of one ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpaceReport {
    pub space_id: String,

    /// Resources seen in storage
    pub visited: usize,

    /// Documents written
    pub indexed: usize,

    /// Resources already indexed with the same mtime and path
    pub unchanged: usize,

    /// Resources skipped because extraction failed, they vanished or a
    /// folder could not be listed
    pub skipped: usize,

    /// Documents removed
    pub removed: usize,

    pub duration_ms: u64,
}

impl IndexSpaceReport {
    fn new(space_id: &SpaceId) -> Self {
        Self {
            space_id: space_id.to_string(),
            ..Default::default()
        }
    }
}

/// Walks storage trees and writes their documents into the per-space indexes
pub struct IngestionPipeline {
    gateway: Arc<dyn StorageGateway>,
    indexes: Arc<dyn IndexProvider>,
    extractor: Arc<dyn Extractor>,
    config: IngestionConfig,

    /// One lock per space; writes to a space never interleave
    locks: DashMap<SpaceKey, Arc<Mutex<()>>>,
}

impl IngestionPipeline {
    pub fn new(
        gateway: Arc<dyn StorageGateway>,
        indexes: Arc<dyn IndexProvider>,
        extractor: Arc<dyn Extractor>,
        config: IngestionConfig,
    ) -> Self {
        Self {
            gateway,
            indexes,
            extractor,
            config,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, key: &SpaceKey) -> Arc<Mutex<()>> {
        self.locks.entry(key.clone()).or_default().clone()
    }

    /// Forget the lock of a space nobody is waiting on
    fn release_lock(&self, key: &SpaceKey) {
        self.locks.remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }

    fn batch_size(&self) -> usize {
        self.config.batch_size.max(1)
    }

    /// Index every resource below the root of `space_id` as `owner`.
    ///
    /// Idempotent. Runs for the same space are serialised; runs for different
    /// spaces proceed independently.
    pub async fn index_space(&self, space_id: &SpaceId, owner: &UserId) -> IngestResult<IndexSpaceReport> {
        let start = Instant::now();
        let lock = self.lock_for(&space_id.space_key());
        let _guard = lock.lock().await;

        info!(space = %space_id, owner = %owner, "Indexing space");

        let token = self.gateway.authenticate(owner).await?;
        let index = self.indexes.index_for(&space_id.space_key()).await?;
        let mut report = IndexSpaceReport::new(space_id);

        self.walk(&token, index.as_ref(), space_id, &space_id.root(), &mut report)
            .await?;

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            space = %space_id,
            visited = report.visited,
            indexed = report.indexed,
            unchanged = report.unchanged,
            skipped = report.skipped,
            duration_ms = report.duration_ms,
            "Space indexed"
        );

        Ok(report)
    }

    /// Index a single resource as it currently is in storage
    pub async fn upsert_resource(
        &self,
        space_id: &SpaceId,
        owner: &UserId,
        id: &ResourceId,
    ) -> IngestResult<IndexSpaceReport> {
        let lock = self.lock_for(&space_id.space_key());
        let _guard = lock.lock().await;

        let token = self.gateway.authenticate(owner).await?;
        let index = self.indexes.index_for(&space_id.space_key()).await?;
        let mut report = IndexSpaceReport::new(space_id);

        let Some(info) = self.stat_current(&token, id).await? else {
            report.skipped += 1;
            return Ok(report);
        };
        report.visited += 1;
        self.index_resource(&token, index.as_ref(), space_id, &info, &mut report)
            .await?;

        Ok(report)
    }

    /// Re-index a resource and everything below it, dropping documents left
    /// at its previous location
    pub async fn reindex_subtree(
        &self,
        space_id: &SpaceId,
        owner: &UserId,
        id: &ResourceId,
    ) -> IngestResult<IndexSpaceReport> {
        let lock = self.lock_for(&space_id.space_key());
        let _guard = lock.lock().await;

        let token = self.gateway.authenticate(owner).await?;
        let index = self.indexes.index_for(&space_id.space_key()).await?;
        let mut report = IndexSpaceReport::new(space_id);

        if *id != space_id.root() {
            let Some(info) = self.stat_current(&token, id).await? else {
                report.skipped += 1;
                return Ok(report);
            };

            if let Some(existing) = index.lookup(id).await? {
                if existing.path != info.path {
                    report.removed += index.remove(id).await?;
                    debug!(resource = %id, from = %existing.path, to = %info.path, "Resource moved");
                }
            }

            report.visited += 1;
            self.index_resource(&token, index.as_ref(), space_id, &info, &mut report)
                .await?;
            if !info.is_folder() {
                return Ok(report);
            }
        }

        self.walk(&token, index.as_ref(), space_id, id, &mut report)
            .await?;
        Ok(report)
    }

    /// Remove a resource and its descendants from the index
    pub async fn remove_resource(&self, space_id: &SpaceId, id: &ResourceId) -> IngestResult<IndexSpaceReport> {
        let lock = self.lock_for(&space_id.space_key());
        let _guard = lock.lock().await;

        let index = self.indexes.index_for(&space_id.space_key()).await?;
        let mut report = IndexSpaceReport::new(space_id);
        report.removed = index.remove(id).await?;

        SEARCH_METRICS
            .indexed_documents
            .with_label_values(&["remove"])
            .inc_by(report.removed as f64);
        debug!(space = %space_id, resource = %id, removed = report.removed, "Resource removed");

        Ok(report)
    }

    /// Drop every document of a space, and its lock once nobody waits on it
    pub async fn purge_space(&self, space_id: &SpaceId) -> IngestResult<IndexSpaceReport> {
        let key = space_id.space_key();
        let outcome = {
            let lock = self.lock_for(&key);
            let _guard = lock.lock().await;
            self.clear_space(space_id).await
        };
        self.release_lock(&key);

        outcome
    }

    async fn clear_space(&self, space_id: &SpaceId) -> IngestResult<IndexSpaceReport> {
        let index = self.indexes.index_for(&space_id.space_key()).await?;
        let mut report = IndexSpaceReport::new(space_id);
        report.removed = index.doc_count().await? as usize;
        index.clear().await?;

        SEARCH_METRICS
            .indexed_documents
            .with_label_values(&["remove"])
            .inc_by(report.removed as f64);
        info!(space = %space_id, removed = report.removed, "Space purged");

        Ok(report)
    }

    /// Apply a lifecycle event; `None` when the event needs no index change
    pub async fn apply(&self, event: &LifecycleEvent) -> IngestResult<Option<IndexSpaceReport>> {
        let report = match event {
            LifecycleEvent::PostprocessingFinished {
                space_id,
                owner,
                resource_id,
            }
            | LifecycleEvent::FileTouched {
                space_id,
                owner,
                resource_id,
            }
            | LifecycleEvent::ContainerCreated {
                space_id,
                owner,
                resource_id,
            }
            | LifecycleEvent::FileVersionRestored {
                space_id,
                owner,
                resource_id,
            } => self.upsert_resource(space_id, owner, resource_id).await?,

            LifecycleEvent::ItemTrashed {
                space_id,
                resource_id,
            } => self.remove_resource(space_id, resource_id).await?,

            LifecycleEvent::ItemRestored {
                space_id,
                owner,
                resource_id,
            }
            | LifecycleEvent::ItemMoved {
                space_id,
                owner,
                resource_id,
            }
            | LifecycleEvent::ShareCreated {
                space_id,
                owner,
                resource_id,
            } => self.reindex_subtree(space_id, owner, resource_id).await?,

            LifecycleEvent::SpaceShared { space_id, owner }
            | LifecycleEvent::SpaceEnabled { space_id, owner } => {
                self.index_space(space_id, owner).await?
            }

            LifecycleEvent::SpaceDisabled { space_id } | LifecycleEvent::SpaceDeleted { space_id } => {
                self.purge_space(space_id).await?
            }

            // Visibility is decided per request from the space listing
            LifecycleEvent::SpaceUnshared { .. }
            | LifecycleEvent::SpaceMembershipExpired { .. }
            | LifecycleEvent::ShareRemoved { .. }
            | LifecycleEvent::ShareExpired { .. } => return Ok(None),
        };

        Ok(Some(report))
    }

    /// Index every resource below `container`, depth first, writing in batches.
    ///
    /// A folder below `container` that vanished or became unreadable is
    /// skipped; only an unavailable backend aborts the walk.
    async fn walk(
        &self,
        token: &AuthToken,
        index: &dyn IndexBackend,
        space_id: &SpaceId,
        container: &ResourceId,
        report: &mut IndexSpaceReport,
    ) -> IngestResult<()> {
        let mut pending = vec![container.clone()];
        let mut batch = Vec::with_capacity(self.batch_size());

        while let Some(folder) = pending.pop() {
            let children = match self.gateway.list_container(token, &folder).await {
                Ok(children) => children,
                Err(e) if folder != *container && !is_outage(&e) => {
                    report.skipped += 1;
                    warn!(space = %space_id, folder = %folder, error = %e, "Cannot list folder, skipping");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            for child in children {
                report.visited += 1;
                if let Some(document) = self.prepare(token, index, space_id, &child, report).await? {
                    batch.push(document);
                }
                if child.is_folder() {
                    pending.push(child.id.clone());
                }
                if batch.len() >= self.batch_size() {
                    self.flush(index, &mut batch, report).await?;
                }
            }
        }

        self.flush(index, &mut batch, report).await
    }

    async fn index_resource(
        &self,
        token: &AuthToken,
        index: &dyn IndexBackend,
        space_id: &SpaceId,
        info: &ResourceInfo,
        report: &mut IndexSpaceReport,
    ) -> IngestResult<()> {
        let mut batch: Vec<Document> = self
            .prepare(token, index, space_id, info, report)
            .await?
            .into_iter()
            .collect();
        self.flush(index, &mut batch, report).await
    }

    /// Current metadata of `id`; `None` when it is gone or hidden from the owner
    async fn stat_current(&self, token: &AuthToken, id: &ResourceId) -> IngestResult<Option<ResourceInfo>> {
        match self.gateway.stat(token, id).await {
            Ok(info) => Ok(Some(info)),
            Err(e) if !is_outage(&e) => {
                warn!(resource = %id, error = %e, "Resource no longer readable, skipping");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The document to write for `info`; `None` when it is current or its
    /// content cannot be extracted
    async fn prepare(
        &self,
        token: &AuthToken,
        index: &dyn IndexBackend,
        space_id: &SpaceId,
        info: &ResourceInfo,
        report: &mut IndexSpaceReport,
    ) -> IngestResult<Option<Document>> {
        if self.config.skip_unchanged {
            if let Some(existing) = index.lookup(&info.id).await? {
                if existing.mtime_secs() == info.mtime.timestamp() && existing.path == info.path {
                    report.unchanged += 1;
                    SEARCH_METRICS
                        .indexed_documents
                        .with_label_values(&["unchanged"])
                        .inc();
                    return Ok(None);
                }
            }
        }

        let body = if info.is_folder() {
            DocumentBody {
                title: None,
                content: String::new(),
                mime_type: info.mime_type.clone(),
                tags: Vec::new(),
            }
        } else {
            match self.extractor.extract(token, info).await {
                Ok(body) => body,
                Err(IngestError::Extraction(reason)) => {
                    report.skipped += 1;
                    SEARCH_METRICS
                        .extraction_failures
                        .with_label_values(&[info.mime_type.as_str()])
                        .inc();
                    warn!(resource = %info.id, path = %info.path, reason = %reason, "Extraction failed, skipping");
                    return Ok(None);
                }
                Err(e) => return Err(e),
            }
        };

        Ok(Some(Document {
            id: info.id.clone(),
            root: space_id.root(),
            parent_id: info.parent_id.clone(),
            path: info.path.clone(),
            name: info.name.clone(),
            size: info.size,
            mtime: info.mtime,
            resource_type: info.resource_type,
            body,
        }))
    }

    /// Write the pending documents in one backend call
    async fn flush(
        &self,
        index: &dyn IndexBackend,
        batch: &mut Vec<Document>,
        report: &mut IndexSpaceReport,
    ) -> IngestResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let documents = std::mem::take(batch);
        let count = documents.len();
        index.upsert_many(documents).await?;

        report.indexed += count;
        SEARCH_METRICS
            .indexed_documents
            .with_label_values(&["upsert"])
            .inc_by(count as f64);
        debug!(documents = count, "Batch indexed");

        Ok(())
    }
}

/// Only an unreachable backend is worth aborting for; anything else concerns one resource
fn is_outage(err: &StorageError) -> bool {
    matches!(err, StorageError::Unavailable(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexRegistry;
    use crate::ingestion::extractor::BasicExtractor;
    use crate::storage::MemoryGateway;

    fn space_id() -> SpaceId {
        SpaceId::new("storageid", "spaceid", "spaceid")
    }

    fn pipeline(batch_size: usize) -> (Arc<IndexRegistry>, IngestionPipeline) {
        let gateway = MemoryGateway::new();
        let root = space_id().root();
        gateway.add_user(UserId::new("owner"));
        gateway.create_space_root(root.clone(), "Owner");
        let docs = gateway.add_folder(&root, "docs-id", "docs");
        for n in 0..5 {
            gateway.add_file(&docs, &format!("file-{}", n), &format!("file-{}.txt", n), "text");
        }

        let indexes = Arc::new(IndexRegistry::in_memory());
        let config = IngestionConfig {
            batch_size,
            ..IngestionConfig::default()
        };
        let pipeline = IngestionPipeline::new(
            Arc::new(gateway),
            indexes.clone(),
            Arc::new(BasicExtractor),
            config,
        );
        (indexes, pipeline)
    }

    #[tokio::test]
    async fn test_walk_flushes_partial_batches() {
        let (indexes, pipeline) = pipeline(2);

        let report = pipeline
            .index_space(&space_id(), &UserId::new("owner"))
            .await
            .unwrap();

        assert_eq!(report.visited, 6);
        assert_eq!(report.indexed, 6);
        let index = indexes.index_for(&space_id().space_key()).await.unwrap();
        assert_eq!(index.doc_count().await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_purge_releases_space_lock() {
        let (_, pipeline) = pipeline(16);
        let owner = UserId::new("owner");

        pipeline.index_space(&space_id(), &owner).await.unwrap();
        assert_eq!(pipeline.locks.len(), 1);

        let report = pipeline.purge_space(&space_id()).await.unwrap();
        assert_eq!(report.removed, 6);
        assert!(pipeline.locks.is_empty());
    }

    #[tokio::test]
    async fn test_purge_keeps_lock_others_hold() {
        let (_, pipeline) = pipeline(16);
        let held = pipeline.lock_for(&space_id().space_key());

        pipeline.purge_space(&space_id()).await.unwrap();
        assert_eq!(pipeline.locks.len(), 1);

        drop(held);
        pipeline.purge_space(&space_id()).await.unwrap();
        assert!(pipeline.locks.is_empty());
    }

    #[tokio::test]
    async fn test_vanished_resource_is_skipped() {
        let (indexes, pipeline) = pipeline(16);
        let gone = ResourceId::new("storageid", "spaceid", "gone");

        let report = pipeline
            .upsert_resource(&space_id(), &UserId::new("owner"), &gone)
            .await
            .unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.indexed, 0);
        let index = indexes.index_for(&space_id().space_key()).await.unwrap();
        assert_eq!(index.doc_count().await.unwrap(), 0);
    }
}
