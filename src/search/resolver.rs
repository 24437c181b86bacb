//! Space directory resolution and target planning

use crate::models::{
    is_within, make_relative_path, Reference, ResourceId, SpaceDescriptor, SpaceKind, UserId,
};
use crate::search::error::{Result, SearchError};
use crate::storage::{AuthToken, StorageError, StorageGateway};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// How a target's partition is reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetKind {
    /// The space's own partition, matches are returned as the index reports them
    Direct,

    /// The partition of the backing grant, matches are rewritten into the mountpoint
    Mountpoint { grant: ResourceId },
}

/// One space the aggregator dispatches a query to
#[derive(Debug, Clone, PartialEq)]
pub struct SearchTarget {
    /// The space as the caller sees it
    pub space: SpaceDescriptor,

    pub kind: TargetKind,

    /// Caller supplied scope when the search was narrowed to this space
    pub scope: Option<Reference>,
}

impl SearchTarget {
    pub fn direct(space: SpaceDescriptor) -> Self {
        Self {
            space,
            kind: TargetKind::Direct,
            scope: None,
        }
    }

    pub fn mountpoint(space: SpaceDescriptor, grant: ResourceId) -> Self {
        Self {
            space,
            kind: TargetKind::Mountpoint { grant },
            scope: None,
        }
    }

    pub fn with_scope(mut self, scope: Reference) -> Self {
        self.scope = Some(scope);
        self
    }
}

/// Resolves the spaces a user can reach and the targets a search fans out to
#[derive(Clone)]
pub struct SpaceResolver {
    gateway: Arc<dyn StorageGateway>,
}

impl SpaceResolver {
    pub fn new(gateway: Arc<dyn StorageGateway>) -> Self {
        Self { gateway }
    }

    /// Every space visible to `user`, read fresh from the storage backend
    pub async fn resolve_spaces(&self, user: &UserId) -> Result<Vec<SpaceDescriptor>> {
        self.gateway.list_spaces(user).await.map_err(|e| {
            warn!(user = %user, error = %e, "Failed to list spaces");
            SearchError::BackendUnavailable(format!("listing spaces failed: {}", e))
        })
    }

    /// The single target a scoped search is confined to
    pub async fn resolve_scope(
        &self,
        token: &AuthToken,
        user: &UserId,
        scope: &Reference,
    ) -> Result<SearchTarget> {
        validate_scope(scope)?;

        let spaces = self.resolve_spaces(user).await?;
        let target = match match_scope(&spaces, scope) {
            Some(target) => target,
            None => self
                .match_mounted_scope(token, &spaces, scope)
                .await?
                .ok_or_else(|| {
                    SearchError::NotFound(format!(
                        "no visible space contains {}",
                        scope.resource_id
                    ))
                })?,
        };

        debug!(
            user = %user,
            scope = %scope.resource_id,
            space = %target.space.id,
            kind = %target.space.kind,
            "Scope resolved"
        );

        Ok(target.with_scope(scope.clone()))
    }

    /// A scope naming a resource below a mounted grant is searched through
    /// the first mountpoint whose grant contains it
    async fn match_mounted_scope(
        &self,
        token: &AuthToken,
        spaces: &[SpaceDescriptor],
        scope: &Reference,
    ) -> Result<Option<SearchTarget>> {
        let id = &scope.resource_id;
        let candidates: Vec<(&SpaceDescriptor, &ResourceId)> = spaces
            .iter()
            .filter(|s| s.kind == SpaceKind::Mountpoint)
            .filter_map(|s| s.grant.as_ref().map(|grant| (s, grant)))
            .filter(|(_, grant)| grant.space_key() == id.space_key())
            .collect();
        if candidates.is_empty() {
            return Ok(None);
        }

        let scope_path = match self.path_of(token, id).await? {
            Some(path) => path,
            None => return Ok(None),
        };

        for (mountpoint, grant) in candidates {
            let Some(grant_path) = self.path_of(token, grant).await? else {
                continue;
            };
            if is_within(&scope_path, &grant_path) {
                return Ok(Some(SearchTarget::mountpoint(mountpoint.clone(), grant.clone())));
            }
        }

        Ok(None)
    }

    /// Relative path of `id`, `None` when it is gone or hidden from the caller
    async fn path_of(&self, token: &AuthToken, id: &ResourceId) -> Result<Option<String>> {
        match self.gateway.get_path(token, id).await {
            Ok(path) => Ok(Some(make_relative_path(&path))),
            Err(StorageError::NotFound(_)) | Err(StorageError::PermissionDenied(_)) => Ok(None),
            Err(e) => Err(SearchError::BackendUnavailable(format!(
                "resolving scope failed: {}",
                e
            ))),
        }
    }
}

/// Turn the visible spaces into search targets, preserving their order.
///
/// Personal and project spaces are searched directly. A mountpoint is
/// searched through its backing grant's partition; the grant itself is
/// never searched on its own, whether a mountpoint mirrors it or the share
/// was not accepted. A second mountpoint for the same grant is dropped.
pub fn plan_targets(spaces: &[SpaceDescriptor]) -> Vec<SearchTarget> {
    let mounted: HashSet<&ResourceId> = spaces
        .iter()
        .filter(|space| space.kind == SpaceKind::Mountpoint)
        .filter_map(|space| space.grant.as_ref())
        .collect();

    let mut planned_grants: HashSet<ResourceId> = HashSet::new();
    let mut targets = Vec::with_capacity(spaces.len());

    for space in spaces {
        match space.kind {
            SpaceKind::Personal | SpaceKind::Project => {
                targets.push(SearchTarget::direct(space.clone()));
            }
            SpaceKind::Mountpoint => match &space.grant {
                Some(grant) if planned_grants.insert(grant.clone()) => {
                    targets.push(SearchTarget::mountpoint(space.clone(), grant.clone()));
                }
                Some(grant) => {
                    debug!(space = %space.id, grant = %grant, "Skipping duplicate mountpoint");
                }
                None => {
                    warn!(space = %space.id, "Mountpoint without a grant reference, skipping");
                }
            },
            SpaceKind::Grant => {
                if mounted.contains(&space.root) {
                    debug!(space = %space.id, "Grant is searched through its mountpoint");
                } else {
                    debug!(space = %space.id, "Grant has no mountpoint, skipping");
                }
            }
        }
    }

    targets
}

/// Match a scope against the listing alone, without storage lookups
fn match_scope(spaces: &[SpaceDescriptor], scope: &Reference) -> Option<SearchTarget> {
    let id = &scope.resource_id;

    if let Some(mountpoint) = spaces
        .iter()
        .find(|s| s.kind == SpaceKind::Mountpoint && &s.root == id)
    {
        match &mountpoint.grant {
            Some(grant) => return Some(SearchTarget::mountpoint(mountpoint.clone(), grant.clone())),
            None => warn!(space = %mountpoint.id, "Scoped mountpoint has no grant reference"),
        }
    }

    if let Some(grant) = spaces
        .iter()
        .find(|s| s.kind == SpaceKind::Grant && &s.root == id)
    {
        return Some(SearchTarget::direct(grant.clone()));
    }

    if let Some(space) = spaces.iter().find(|s| s.is_direct() && &s.root == id) {
        return Some(SearchTarget::direct(space.clone()));
    }

    spaces
        .iter()
        .find(|s| s.is_direct() && s.space_key() == id.space_key())
        .map(|space| SearchTarget::direct(space.clone()))
}

/// Reject scopes that can never name a resource
pub fn validate_scope(scope: &Reference) -> Result<()> {
    if !scope.resource_id.is_complete() {
        return Err(SearchError::InvalidArgument(format!(
            "scope resource id '{}' is incomplete",
            scope.resource_id
        )));
    }
    if scope.path.starts_with('/') {
        return Err(SearchError::InvalidArgument(format!(
            "scope path '{}' must be relative",
            scope.path
        )));
    }
    if scope.path.split('/').any(|segment| segment == "..") {
        return Err(SearchError::InvalidArgument(format!(
            "scope path '{}' must not leave its resource",
            scope.path
        )));
    }
    Ok(())
}
