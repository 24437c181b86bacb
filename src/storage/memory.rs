//! In-memory storage gateway (fixtures, local runs and testing)

use crate::models::{
    join_relative, make_relative_path, timestamp_from_secs, ResourceId, ResourceType,
    SpaceDescriptor, SpaceId, UserId,
};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::gateway::{AuthToken, ResourceInfo, StorageGateway};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

struct Entry {
    info: ResourceInfo,
    content: Vec<u8>,
    children: Vec<ResourceId>,
}

#[derive(Default)]
struct Inner {
    users: HashSet<UserId>,
    spaces: HashMap<UserId, Vec<SpaceDescriptor>>,
    entries: HashMap<ResourceId, Entry>,
    tokens: HashMap<String, UserId>,
}

/// Storage gateway backed by an in-process resource tree
#[derive(Default)]
pub struct MemoryGateway {
    inner: RwLock<Inner>,
    unavailable: AtomicBool,
    list_spaces_calls: AtomicUsize,
    download_calls: AtomicUsize,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load users, spaces and resource trees from a JSON fixture file
    pub fn from_fixture(path: &Path) -> StorageResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_fixture_str(&raw)
    }

    /// Load users, spaces and resource trees from a JSON fixture document
    pub fn from_fixture_str(raw: &str) -> StorageResult<Self> {
        let fixture: StorageFixture = serde_json::from_str(raw)?;
        let gateway = Self::new();

        for user in &fixture.users {
            gateway.add_user(UserId::new(user));
        }

        for tree in &fixture.trees {
            let root = tree.root.root();
            gateway.create_space_root(root.clone(), &tree.name);
            for entry in &tree.entries {
                gateway.add_path(&root, entry)?;
            }
        }

        for visible in fixture.spaces {
            gateway.add_space(UserId::new(visible.visible_to), visible.space);
        }

        tracing::info!(
            users = fixture.users.len(),
            trees = fixture.trees.len(),
            "Storage fixture loaded"
        );

        Ok(gateway)
    }

    pub fn add_user(&self, user: UserId) {
        self.inner.write().users.insert(user);
    }

    /// Make `space` visible to `user`
    pub fn add_space(&self, user: UserId, space: SpaceDescriptor) {
        let mut inner = self.inner.write();
        inner.users.insert(user.clone());
        inner.users.insert(space.owner.clone());
        inner.spaces.entry(user).or_default().push(space);
    }

    /// Create the root folder of a space
    pub fn create_space_root(&self, root: ResourceId, name: &str) {
        let info = ResourceInfo {
            id: root.clone(),
            parent_id: None,
            name: name.to_string(),
            path: ".".to_string(),
            size: 0,
            mtime: Utc::now(),
            resource_type: ResourceType::Folder,
            mime_type: "httpd/unix-directory".to_string(),
        };
        self.inner.write().entries.insert(
            root,
            Entry {
                info,
                content: Vec::new(),
                children: Vec::new(),
            },
        );
    }

    pub fn add_folder(&self, parent: &ResourceId, opaque_id: &str, name: &str) -> ResourceId {
        self.insert_child(parent, opaque_id, name, ResourceType::Folder, Vec::new(), None)
    }

    pub fn add_file(
        &self,
        parent: &ResourceId,
        opaque_id: &str,
        name: &str,
        content: impl Into<Vec<u8>>,
    ) -> ResourceId {
        self.insert_child(parent, opaque_id, name, ResourceType::File, content.into(), None)
    }

    /// Replace a file's content and bump its modification time
    pub fn touch(&self, id: &ResourceId, content: impl Into<Vec<u8>>, mtime_secs: i64) {
        let mut inner = self.inner.write();
        if let Some(entry) = inner.entries.get_mut(id) {
            entry.content = content.into();
            entry.info.size = entry.content.len() as u64;
            entry.info.mtime = timestamp_from_secs(mtime_secs);
        }
    }

    /// Remove a resource and everything below it
    pub fn remove(&self, id: &ResourceId) {
        let mut inner = self.inner.write();
        let mut stack = vec![id.clone()];
        while let Some(current) = stack.pop() {
            if let Some(entry) = inner.entries.remove(&current) {
                stack.extend(entry.children);
                if let Some(parent_id) = entry.info.parent_id {
                    if let Some(parent) = inner.entries.get_mut(&parent_id) {
                        parent.children.retain(|child| child != &current);
                    }
                }
            }
        }
    }

    /// Move a resource below `new_parent`, keeping its id; paths below it follow
    pub fn move_to(&self, id: &ResourceId, new_parent: &ResourceId) -> StorageResult<()> {
        let mut inner = self.inner.write();

        let parent_path = inner
            .entries
            .get(new_parent)
            .map(|entry| entry.info.path.clone())
            .ok_or_else(|| StorageError::NotFound(format!("container {}", new_parent)))?;
        let old_parent = inner
            .entries
            .get(id)
            .ok_or_else(|| StorageError::NotFound(format!("resource {}", id)))?
            .info
            .parent_id
            .clone();

        if let Some(old_parent) = old_parent {
            if let Some(entry) = inner.entries.get_mut(&old_parent) {
                entry.children.retain(|child| child != id);
            }
        }
        if let Some(entry) = inner.entries.get_mut(new_parent) {
            entry.children.push(id.clone());
        }

        let mut pending = vec![(id.clone(), parent_path)];
        while let Some((current, parent_path)) = pending.pop() {
            if let Some(entry) = inner.entries.get_mut(&current) {
                if current == *id {
                    entry.info.parent_id = Some(new_parent.clone());
                }
                entry.info.path = join_relative(&parent_path, &entry.info.name);
                let path = entry.info.path.clone();
                pending.extend(entry.children.iter().map(|child| (child.clone(), path.clone())));
            }
        }

        Ok(())
    }

    /// Simulate a backend outage
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn list_spaces_calls(&self) -> usize {
        self.list_spaces_calls.load(Ordering::SeqCst)
    }

    pub fn download_calls(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }

    fn insert_child(
        &self,
        parent: &ResourceId,
        opaque_id: &str,
        name: &str,
        resource_type: ResourceType,
        content: Vec<u8>,
        mtime_secs: Option<i64>,
    ) -> ResourceId {
        let id = ResourceId::new(&parent.storage_id, &parent.space_id, opaque_id);
        let mut inner = self.inner.write();

        let parent_path = inner
            .entries
            .get(parent)
            .map(|entry| entry.info.path.clone())
            .unwrap_or_else(|| ".".to_string());

        let info = ResourceInfo {
            id: id.clone(),
            parent_id: Some(parent.clone()),
            name: name.to_string(),
            path: join_relative(&parent_path, name),
            size: content.len() as u64,
            mtime: mtime_secs.map(timestamp_from_secs).unwrap_or_else(Utc::now),
            resource_type,
            mime_type: match resource_type {
                ResourceType::Folder => "httpd/unix-directory".to_string(),
                ResourceType::File => mime_from_name(name).to_string(),
            },
        };

        if let Some(parent_entry) = inner.entries.get_mut(parent) {
            if !parent_entry.children.contains(&id) {
                parent_entry.children.push(id.clone());
            }
        }
        inner.entries.insert(
            id.clone(),
            Entry {
                info,
                content,
                children: Vec::new(),
            },
        );

        id
    }

    /// Create a fixture entry, creating intermediate folders on the way
    fn add_path(&self, root: &ResourceId, entry: &EntryFixture) -> StorageResult<()> {
        let relative = make_relative_path(&entry.path);
        let segments: Vec<&str> = relative
            .trim_start_matches("./")
            .split('/')
            .filter(|s| !s.is_empty() && *s != ".")
            .collect();

        let (name, folders) = segments
            .split_last()
            .ok_or_else(|| StorageError::InvalidData(format!("empty fixture path in {}", root)))?;

        let mut parent = root.clone();
        let mut walked = String::from(".");
        for folder in folders {
            walked = join_relative(&walked, folder);
            let existing = self.find_child(&parent, folder);
            parent = match existing {
                Some(id) => id,
                None => self.add_folder(&parent, &opaque_from_path(root, &walked), folder),
            };
        }

        let opaque_id = entry
            .id
            .clone()
            .unwrap_or_else(|| opaque_from_path(root, &relative));
        match &entry.content {
            Some(content) => {
                self.insert_child(
                    &parent,
                    &opaque_id,
                    name,
                    ResourceType::File,
                    content.clone().into_bytes(),
                    entry.mtime,
                );
            }
            None => {
                self.insert_child(&parent, &opaque_id, name, ResourceType::Folder, Vec::new(), entry.mtime);
            }
        }

        Ok(())
    }

    fn find_child(&self, parent: &ResourceId, name: &str) -> Option<ResourceId> {
        let inner = self.inner.read();
        inner.entries.get(parent).and_then(|entry| {
            entry
                .children
                .iter()
                .find(|child| {
                    inner
                        .entries
                        .get(*child)
                        .map(|c| c.info.name == name)
                        .unwrap_or(false)
                })
                .cloned()
        })
    }

    fn check_available(&self) -> StorageResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("memory gateway offline".to_string()));
        }
        Ok(())
    }

    fn check_token(&self, token: &AuthToken) -> StorageResult<()> {
        if self.inner.read().tokens.contains_key(&token.0) {
            Ok(())
        } else {
            Err(StorageError::PermissionDenied("unknown token".to_string()))
        }
    }
}

#[async_trait]
impl StorageGateway for MemoryGateway {
    async fn authenticate(&self, user: &UserId) -> StorageResult<AuthToken> {
        self.check_available()?;
        let mut inner = self.inner.write();
        if !inner.users.contains(user) {
            return Err(StorageError::NotFound(format!("user {}", user)));
        }
        let token = format!("token-{}", user);
        inner.tokens.insert(token.clone(), user.clone());
        Ok(AuthToken(token))
    }

    async fn list_spaces(&self, user: &UserId) -> StorageResult<Vec<SpaceDescriptor>> {
        self.list_spaces_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self.inner.read().spaces.get(user).cloned().unwrap_or_default())
    }

    async fn stat(&self, token: &AuthToken, id: &ResourceId) -> StorageResult<ResourceInfo> {
        self.check_available()?;
        self.check_token(token)?;
        self.inner
            .read()
            .entries
            .get(id)
            .map(|entry| entry.info.clone())
            .ok_or_else(|| StorageError::NotFound(format!("resource {}", id)))
    }

    async fn list_container(
        &self,
        token: &AuthToken,
        id: &ResourceId,
    ) -> StorageResult<Vec<ResourceInfo>> {
        self.check_available()?;
        self.check_token(token)?;
        let inner = self.inner.read();
        let entry = inner
            .entries
            .get(id)
            .ok_or_else(|| StorageError::NotFound(format!("container {}", id)))?;
        Ok(entry
            .children
            .iter()
            .filter_map(|child| inner.entries.get(child).map(|c| c.info.clone()))
            .collect())
    }

    async fn get_path(&self, token: &AuthToken, id: &ResourceId) -> StorageResult<String> {
        let info = self.stat(token, id).await?;
        Ok(format!("/{}", info.path.trim_start_matches('.').trim_start_matches('/')))
    }

    async fn download(&self, token: &AuthToken, id: &ResourceId) -> StorageResult<Vec<u8>> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        self.check_token(token)?;
        self.inner
            .read()
            .entries
            .get(id)
            .map(|entry| entry.content.clone())
            .ok_or_else(|| StorageError::NotFound(format!("resource {}", id)))
    }
}

/// Guess a mime type from a file extension
pub fn mime_from_name(name: &str) -> &'static str {
    let extension = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "txt" | "log" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "odt" => "application/vnd.oasis.opendocument.text",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => "application/octet-stream",
    }
}

fn opaque_from_path(root: &ResourceId, relative: &str) -> String {
    format!(
        "{}-{}",
        root.opaque_id,
        relative.trim_start_matches("./").replace('/', "-")
    )
}

#[derive(Debug, Deserialize)]
struct StorageFixture {
    #[serde(default)]
    users: Vec<String>,
    #[serde(default)]
    trees: Vec<TreeFixture>,
    #[serde(default)]
    spaces: Vec<VisibleSpaceFixture>,
}

#[derive(Debug, Deserialize)]
struct TreeFixture {
    root: SpaceId,
    name: String,
    #[serde(default)]
    entries: Vec<EntryFixture>,
}

#[derive(Debug, Deserialize)]
struct EntryFixture {
    path: String,
    #[serde(default)]
    id: Option<String>,
    /// Files carry content; entries without it are folders
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    mtime: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct VisibleSpaceFixture {
    visible_to: String,
    space: SpaceDescriptor,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SpaceKind;

    fn gateway_with_tree() -> (MemoryGateway, ResourceId) {
        let gateway = MemoryGateway::new();
        let root = ResourceId::new("storageid", "spaceid", "spaceid");
        gateway.add_user(UserId::new("owner"));
        gateway.create_space_root(root.clone(), "owner space");
        let grant = gateway.add_folder(&root, "grant", "grant");
        let path = gateway.add_folder(&grant, "grant-path", "path");
        gateway.add_file(&path, "shared", "Shared.pdf", "shared content");
        (gateway, root)
    }

    #[tokio::test]
    async fn test_get_path_is_absolute() {
        let (gateway, _) = gateway_with_tree();
        let token = gateway.authenticate(&UserId::new("owner")).await.unwrap();
        let id = ResourceId::new("storageid", "spaceid", "grant-path");
        assert_eq!(gateway.get_path(&token, &id).await.unwrap(), "/grant/path");
    }

    #[tokio::test]
    async fn test_list_container_and_remove() {
        let (gateway, root) = gateway_with_tree();
        let token = gateway.authenticate(&UserId::new("owner")).await.unwrap();

        let children = gateway.list_container(&token, &root).await.unwrap();
        assert_eq!(children.len(), 1);
        assert!(children[0].is_folder());

        gateway.remove(&ResourceId::new("storageid", "spaceid", "grant"));
        assert!(gateway.list_container(&token, &root).await.unwrap().is_empty());
        assert!(gateway
            .stat(&token, &ResourceId::new("storageid", "spaceid", "shared"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_move_rewrites_descendant_paths() {
        let (gateway, root) = gateway_with_tree();
        let token = gateway.authenticate(&UserId::new("owner")).await.unwrap();
        let path = ResourceId::new("storageid", "spaceid", "grant-path");

        gateway.move_to(&path, &root).unwrap();

        let shared = ResourceId::new("storageid", "spaceid", "shared");
        assert_eq!(gateway.get_path(&token, &shared).await.unwrap(), "/path/Shared.pdf");
        assert_eq!(gateway.list_container(&token, &root).await.unwrap().len(), 2);
        assert_eq!(gateway.stat(&token, &path).await.unwrap().parent_id, Some(root));
    }

    #[tokio::test]
    async fn test_unavailable_gateway() {
        let (gateway, _) = gateway_with_tree();
        gateway.set_unavailable(true);
        let err = gateway.list_spaces(&UserId::new("owner")).await.unwrap_err();
        assert!(matches!(err, StorageError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_unknown_token_is_rejected() {
        let (gateway, root) = gateway_with_tree();
        let err = gateway
            .stat(&AuthToken("forged".to_string()), &root)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_fixture_loading() {
        let fixture = r#"{
            "users": ["alice"],
            "trees": [{
                "root": "storageid$alice!alice",
                "name": "Alice",
                "entries": [
                    {"path": "docs/report.txt", "content": "quarterly numbers"},
                    {"path": "docs/empty"}
                ]
            }],
            "spaces": [{
                "visible_to": "alice",
                "space": {
                    "id": "storageid$alice!alice",
                    "root": {"storage_id": "storageid", "space_id": "alice", "opaque_id": "alice"},
                    "owner": "alice",
                    "kind": "personal",
                    "name": "Alice"
                }
            }]
        }"#;

        let gateway = MemoryGateway::from_fixture_str(fixture).unwrap();
        let alice = UserId::new("alice");
        let spaces = gateway.list_spaces(&alice).await.unwrap();
        assert_eq!(spaces.len(), 1);
        assert_eq!(spaces[0].kind, SpaceKind::Personal);

        let token = gateway.authenticate(&alice).await.unwrap();
        let docs = gateway
            .list_container(&token, &ResourceId::new("storageid", "alice", "alice-docs"))
            .await
            .unwrap();
        assert_eq!(docs.len(), 2);
        let report = docs.iter().find(|d| d.name == "report.txt").unwrap();
        assert_eq!(report.path, "./docs/report.txt");
        assert_eq!(report.mime_type, "text/plain");
    }

    #[test]
    fn test_mime_from_name() {
        assert_eq!(mime_from_name("Foo.PDF"), "application/pdf");
        assert_eq!(mime_from_name("noext"), "application/octet-stream");
    }
}
