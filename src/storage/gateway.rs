//! Storage gateway abstraction

use crate::models::{ResourceId, ResourceType, SpaceDescriptor, UserId};
use crate::storage::error::StorageResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Access token issued by the storage backend for one user
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken(pub String);

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(***)")
    }
}

/// Metadata of one file or folder as reported by stat/list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceInfo {
    pub id: ResourceId,
    pub parent_id: Option<ResourceId>,
    pub name: String,

    /// Path relative to the space root, `./`-prefixed
    pub path: String,

    pub size: u64,
    pub mtime: DateTime<Utc>,
    pub resource_type: ResourceType,
    pub mime_type: String,
}

impl ResourceInfo {
    pub fn is_folder(&self) -> bool {
        self.resource_type == ResourceType::Folder
    }
}

/// Storage/metadata backend consumed by the resolver, translator and ingestion pipeline
#[async_trait]
pub trait StorageGateway: Send + Sync {
    /// Obtain a token acting on behalf of `user`
    async fn authenticate(&self, user: &UserId) -> StorageResult<AuthToken>;

    /// Every space visible to `user`, in a stable order
    async fn list_spaces(&self, user: &UserId) -> StorageResult<Vec<SpaceDescriptor>>;

    /// Metadata of a single resource
    async fn stat(&self, token: &AuthToken, id: &ResourceId) -> StorageResult<ResourceInfo>;

    /// Direct children of a folder
    async fn list_container(
        &self,
        token: &AuthToken,
        id: &ResourceId,
    ) -> StorageResult<Vec<ResourceInfo>>;

    /// Absolute path of a resource inside its space, e.g. `/grant/path`
    async fn get_path(&self, token: &AuthToken, id: &ResourceId) -> StorageResult<String>;

    /// Raw content of a file
    async fn download(&self, token: &AuthToken, id: &ResourceId) -> StorageResult<Vec<u8>>;
}
