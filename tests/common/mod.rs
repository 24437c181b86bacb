//! Common test utilities: scripted index backends and storage fixtures
//!
//! The scenarios mirror a typical deployment: a user with a personal space
//! and a share received from another user, accepted as a mountpoint.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use space_search::index::{IndexBackend, IndexError, IndexHits, IndexProvider, IndexQuery, IndexResult};
use space_search::models::{
    Document, Match, Reference, ResourceId, ResourceType, SpaceDescriptor, SpaceKey, SpaceKind,
    UserId,
};
use space_search::search::{SearchAggregator, SearchConfig, SearchConfigBuilder};
use space_search::storage::{
    AuthToken, MemoryGateway, ResourceInfo, StorageError, StorageGateway, StorageResult,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const USER: &str = "user";
pub const OWNER: &str = "owner";

pub fn personal_root() -> ResourceId {
    ResourceId::new("storageid", "personalspace", "personalspace")
}

pub fn owner_root() -> ResourceId {
    ResourceId::new("storageid", "spaceid", "spaceid")
}

/// Root of the shared folder `/grant/path` in the owner's space
pub fn grant_root() -> ResourceId {
    ResourceId::new("storageid", "spaceid", "grantpathid")
}

pub fn mountpoint_root() -> ResourceId {
    ResourceId::new("storageid", "mountpoint", "mountpointid")
}

pub fn personal_space() -> SpaceDescriptor {
    SpaceDescriptor::new(personal_root(), UserId::new(USER), SpaceKind::Personal, "Personal")
}

pub fn grant_space() -> SpaceDescriptor {
    SpaceDescriptor::new(grant_root(), UserId::new(OWNER), SpaceKind::Grant, "path")
}

pub fn mountpoint_space() -> SpaceDescriptor {
    SpaceDescriptor::mountpoint(mountpoint_root(), UserId::new(USER), "Shared", grant_root())
}

/// Storage with the personal space of `user` and the owner's shared tree
pub fn shared_storage() -> Arc<MemoryGateway> {
    let gateway = MemoryGateway::new();
    gateway.add_user(UserId::new(USER));
    gateway.add_user(UserId::new(OWNER));

    gateway.create_space_root(personal_root(), "Personal");
    gateway.add_file(&personal_root(), "foo-id", "Foo.pdf", "foo");
    gateway.add_file(&personal_root(), "irrelevant-id", "Irrelevant.pdf", "nothing here");

    gateway.create_space_root(owner_root(), "Owner");
    let grant = gateway.add_folder(&owner_root(), "grantopaqueid", "grant");
    let path = gateway.add_folder(&grant, "grantpathid", "path");
    let to = gateway.add_folder(&path, "toid", "to");
    gateway.add_file(&to, "shared-id", "Shared.pdf", "shared");
    gateway.add_file(&owner_root(), "private-id", "Private.pdf", "owner only");

    Arc::new(gateway)
}

/// `shared_storage` with the share accepted by `user`
pub fn accepted_share_storage() -> Arc<MemoryGateway> {
    let gateway = shared_storage();
    gateway.add_space(UserId::new(USER), personal_space());
    gateway.add_space(UserId::new(USER), grant_space());
    gateway.add_space(UserId::new(USER), mountpoint_space());
    gateway
}

pub fn hit(root: ResourceId, opaque_id: &str, path: &str, score: f32) -> Match {
    let name = path.rsplit('/').next().unwrap_or(path).to_string();
    Match {
        id: ResourceId::new(&root.storage_id, &root.space_id, opaque_id),
        name,
        reference: Reference::new(root, path),
        score,
        size: 0,
        mtime: None,
        mime_type: "application/pdf".to_string(),
        resource_type: ResourceType::File,
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Behaviour {
    Answer,
    Fail,
    Delay(Duration),
}

/// Index backend answering every query with a fixed set of matches
pub struct ScriptedIndex {
    hits: Vec<Match>,
    total: Option<u64>,
    behaviour: Behaviour,
    calls: AtomicUsize,
    queries: Mutex<Vec<IndexQuery>>,
}

impl ScriptedIndex {
    pub fn answering(hits: Vec<Match>) -> Arc<Self> {
        Arc::new(Self::new(hits, Behaviour::Answer))
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self::new(Vec::new(), Behaviour::Fail))
    }

    pub fn slow(hits: Vec<Match>, delay: Duration) -> Arc<Self> {
        Arc::new(Self::new(hits, Behaviour::Delay(delay)))
    }

    /// Report `total` matches regardless of how many hits are scripted
    pub fn with_total(hits: Vec<Match>, total: u64) -> Arc<Self> {
        let mut index = Self::new(hits, Behaviour::Answer);
        index.total = Some(total);
        Arc::new(index)
    }

    fn new(hits: Vec<Match>, behaviour: Behaviour) -> Self {
        Self {
            hits,
            total: None,
            behaviour,
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<IndexQuery> {
        self.queries.lock().clone()
    }

    fn answer(&self, query: &IndexQuery) -> IndexHits {
        let total = self.total.unwrap_or(self.hits.len() as u64);
        let mut matches = self.hits.clone();
        if let Some(limit) = query.limit {
            matches.truncate(limit);
        }
        IndexHits {
            matches,
            total_matches: total,
        }
    }
}

#[async_trait]
impl IndexBackend for ScriptedIndex {
    async fn search(&self, query: &IndexQuery) -> IndexResult<IndexHits> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().push(query.clone());

        match self.behaviour {
            Behaviour::Answer => Ok(self.answer(query)),
            Behaviour::Fail => Err(IndexError::Unavailable("scripted outage".to_string())),
            Behaviour::Delay(delay) => {
                tokio::time::sleep(delay).await;
                Ok(self.answer(query))
            }
        }
    }

    async fn upsert(&self, _document: Document) -> IndexResult<()> {
        Ok(())
    }

    async fn remove(&self, _id: &ResourceId) -> IndexResult<usize> {
        Ok(0)
    }

    async fn doc_count(&self) -> IndexResult<u64> {
        Ok(self.hits.len() as u64)
    }

    async fn lookup(&self, _id: &ResourceId) -> IndexResult<Option<Document>> {
        Ok(None)
    }

    async fn clear(&self) -> IndexResult<()> {
        Ok(())
    }
}

/// Index provider with a fixed backend per space
#[derive(Default)]
pub struct ScriptedProvider {
    backends: HashMap<SpaceKey, Arc<dyn IndexBackend>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: SpaceKey, backend: Arc<dyn IndexBackend>) -> Self {
        self.backends.insert(key, backend);
        self
    }
}

#[async_trait]
impl IndexProvider for ScriptedProvider {
    async fn index_for(&self, key: &SpaceKey) -> IndexResult<Arc<dyn IndexBackend>> {
        self.backends
            .get(key)
            .cloned()
            .ok_or_else(|| IndexError::Unavailable(format!("no partition for {}", key)))
    }
}

pub fn fast_config() -> SearchConfig {
    SearchConfigBuilder::new()
        .per_space_timeout(Duration::from_secs(5))
        .build()
}

pub fn aggregator(
    gateway: Arc<MemoryGateway>,
    provider: ScriptedProvider,
    config: SearchConfig,
) -> SearchAggregator {
    SearchAggregator::new(gateway, Arc::new(provider), config)
}

/// Memory storage with injected faults: a slow space listing, or one
/// folder whose listing fails
pub struct FaultyGateway {
    inner: Arc<MemoryGateway>,
    listing_delay: Option<Duration>,
    unlistable: Option<(ResourceId, StorageError)>,
}

impl FaultyGateway {
    pub fn new(inner: Arc<MemoryGateway>) -> Self {
        Self {
            inner,
            listing_delay: None,
            unlistable: None,
        }
    }

    pub fn slow_listing(mut self, delay: Duration) -> Self {
        self.listing_delay = Some(delay);
        self
    }

    pub fn unlistable(mut self, folder: ResourceId, error: StorageError) -> Self {
        self.unlistable = Some((folder, error));
        self
    }
}

#[async_trait]
impl StorageGateway for FaultyGateway {
    async fn authenticate(&self, user: &UserId) -> StorageResult<AuthToken> {
        self.inner.authenticate(user).await
    }

    async fn list_spaces(&self, user: &UserId) -> StorageResult<Vec<SpaceDescriptor>> {
        if let Some(delay) = self.listing_delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.list_spaces(user).await
    }

    async fn stat(&self, token: &AuthToken, id: &ResourceId) -> StorageResult<ResourceInfo> {
        self.inner.stat(token, id).await
    }

    async fn list_container(
        &self,
        token: &AuthToken,
        id: &ResourceId,
    ) -> StorageResult<Vec<ResourceInfo>> {
        match &self.unlistable {
            Some((folder, error)) if folder == id => Err(error.clone()),
            _ => self.inner.list_container(token, id).await,
        }
    }

    async fn get_path(&self, token: &AuthToken, id: &ResourceId) -> StorageResult<String> {
        self.inner.get_path(token, id).await
    }

    async fn download(&self, token: &AuthToken, id: &ResourceId) -> StorageResult<Vec<u8>> {
        self.inner.download(token, id).await
    }
}
