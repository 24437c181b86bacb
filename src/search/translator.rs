//! Per-space query translation and match path rewriting

use crate::index::IndexQuery;
use crate::models::{
    join_relative, make_relative_path, strip_relative_prefix, Match, Reference, ResourceId,
    SearchRequest, SpaceKey, SpaceKind,
};
use crate::search::error::Result;
use crate::search::resolver::{SearchTarget, TargetKind};
use crate::storage::{AuthToken, StorageGateway};
use std::sync::Arc;

/// How matches coming out of a partition are mapped back to the caller's view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathRewrite {
    /// Matches are returned as the index reports them
    Identity,

    /// Matches below `prefix` are re-rooted at the mountpoint `root`
    Mountpoint { prefix: String, root: ResourceId },
}

impl PathRewrite {
    /// Rewrite one match; `None` when it falls outside the mounted subtree
    pub fn apply(&self, mut hit: Match) -> Option<Match> {
        match self {
            PathRewrite::Identity => Some(hit),
            PathRewrite::Mountpoint { prefix, root } => {
                let path = strip_relative_prefix(&hit.reference.path, prefix)?;
                hit.reference = Reference::new(root.clone(), path);
                Some(hit)
            }
        }
    }
}

/// A target's query, ready for dispatch
#[derive(Debug, Clone)]
pub struct TranslatedQuery {
    /// Partition to query
    pub key: SpaceKey,
    pub query: IndexQuery,
    pub rewrite: PathRewrite,
}

/// Rewrites aggregate requests into space-relative index queries
#[derive(Clone)]
pub struct QueryTranslator {
    gateway: Arc<dyn StorageGateway>,
}

impl QueryTranslator {
    pub fn new(gateway: Arc<dyn StorageGateway>) -> Self {
        Self { gateway }
    }

    pub async fn translate(
        &self,
        token: &AuthToken,
        request: &SearchRequest,
        target: &SearchTarget,
        limit: Option<usize>,
    ) -> Result<TranslatedQuery> {
        let space = &target.space;

        let (key, index_root, base, rewrite) = match &target.kind {
            TargetKind::Mountpoint { grant } => {
                let prefix = self.relative_path(token, grant).await?;
                let rewrite = PathRewrite::Mountpoint {
                    prefix: prefix.clone(),
                    root: space.root.clone(),
                };
                (grant.space_key(), grant.clone(), prefix, rewrite)
            }
            TargetKind::Direct if space.kind == SpaceKind::Grant => {
                let base = self.relative_path(token, &space.root).await?;
                (space.space_key(), space.root.clone(), base, PathRewrite::Identity)
            }
            TargetKind::Direct => (
                space.space_key(),
                space.root.clone(),
                ".".to_string(),
                PathRewrite::Identity,
            ),
        };

        let subtree = match &target.scope {
            None => base,
            Some(scope) => {
                let anchor = if scope.resource_id == space.root {
                    base
                } else {
                    self.relative_path(token, &scope.resource_id).await?
                };
                join_relative(&anchor, &scope.path)
            }
        };

        let mut query = IndexQuery::parse(&request.query, index_root)?.with_limit(limit);
        if subtree != "." {
            query = query.with_scope_path(subtree);
        }

        Ok(TranslatedQuery {
            key,
            query,
            rewrite,
        })
    }

    /// Path of `id` inside its space in `./a/b` form
    async fn relative_path(&self, token: &AuthToken, id: &ResourceId) -> Result<String> {
        let path = self.gateway.get_path(token, id).await?;
        Ok(make_relative_path(&path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ResourceType, SpaceDescriptor, UserId};
    use crate::storage::MemoryGateway;

    fn gateway() -> Arc<MemoryGateway> {
        let gateway = MemoryGateway::new();
        let root = ResourceId::new("storageid", "spaceid", "spaceid");
        gateway.add_user(UserId::new("user"));
        gateway.create_space_root(root.clone(), "owner space");
        let grant = gateway.add_folder(&root, "grantopaqueid", "grant");
        let path = gateway.add_folder(&grant, "grantpathid", "path");
        gateway.add_folder(&path, "toid", "to");
        Arc::new(gateway)
    }

    fn hit(path: &str) -> Match {
        Match {
            id: ResourceId::new("storageid", "spaceid", "grant-shared-id"),
            name: "Shared.pdf".to_string(),
            reference: Reference::new(ResourceId::new("storageid", "spaceid", "spaceid"), path),
            score: 2.0,
            size: 0,
            mtime: None,
            mime_type: String::new(),
            resource_type: ResourceType::File,
        }
    }

    #[test]
    fn test_mountpoint_rewrite() {
        let mountpoint_root = ResourceId::new("storageid", "mountpoint", "mountpointid");
        let rewrite = PathRewrite::Mountpoint {
            prefix: "./grant/path".to_string(),
            root: mountpoint_root.clone(),
        };

        let rewritten = rewrite.apply(hit("./grant/path/to/Shared.pdf")).unwrap();
        assert_eq!(rewritten.reference.path, "./to/Shared.pdf");
        assert_eq!(rewritten.reference.resource_id, mountpoint_root);
        assert_eq!(rewritten.id.opaque_id, "grant-shared-id");

        assert!(rewrite.apply(hit("./elsewhere/Shared.pdf")).is_none());
    }

    #[tokio::test]
    async fn test_translate_mountpoint_with_scope_path() {
        let gateway = gateway();
        let token = gateway.authenticate(&UserId::new("user")).await.unwrap();
        let translator = QueryTranslator::new(gateway);

        let grant = ResourceId::new("storageid", "spaceid", "grantpathid");
        let mountpoint = SpaceDescriptor::mountpoint(
            ResourceId::new("storageid", "mountpoint", "mountpointid"),
            UserId::new("user"),
            "Shared",
            grant.clone(),
        );
        let target = SearchTarget::mountpoint(mountpoint.clone(), grant)
            .with_scope(Reference::new(mountpoint.root.clone(), "./to"));

        let translated = translator
            .translate(&token, &SearchRequest::new("name:foo"), &target, Some(5))
            .await
            .unwrap();

        assert_eq!(translated.key, SpaceKey::new("storageid", "spaceid"));
        assert_eq!(translated.query.query, "Name:foo");
        assert_eq!(translated.query.scope_path.as_deref(), Some("./grant/path/to"));
        assert_eq!(translated.query.limit, Some(5));
        assert_eq!(
            translated.rewrite,
            PathRewrite::Mountpoint {
                prefix: "./grant/path".to_string(),
                root: mountpoint.root,
            }
        );
    }

    #[tokio::test]
    async fn test_translate_personal_passes_query_through() {
        let gateway = gateway();
        let token = gateway.authenticate(&UserId::new("user")).await.unwrap();
        let translator = QueryTranslator::new(gateway);

        let space = SpaceDescriptor::new(
            ResourceId::new("storageid", "spaceid", "spaceid"),
            UserId::new("user"),
            SpaceKind::Personal,
            "Personal",
        );
        let translated = translator
            .translate(&token, &SearchRequest::new("Size:<10"), &SearchTarget::direct(space), None)
            .await
            .unwrap();

        assert_eq!(translated.query.query, "Size:<10");
        assert_eq!(translated.query.scope_path, None);
        assert_eq!(translated.rewrite, PathRewrite::Identity);
    }
}
