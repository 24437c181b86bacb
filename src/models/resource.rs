use serde::{Deserialize, Serialize};
use std::fmt;

/// Globally unique identifier of a file or folder
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct ResourceId {
    pub storage_id: String,
    pub space_id: String,
    pub opaque_id: String,
}

impl ResourceId {
    pub fn new(
        storage_id: impl Into<String>,
        space_id: impl Into<String>,
        opaque_id: impl Into<String>,
    ) -> Self {
        Self {
            storage_id: storage_id.into(),
            space_id: space_id.into(),
            opaque_id: opaque_id.into(),
        }
    }

    /// Key of the space (and therefore the index partition) this resource lives in
    pub fn space_key(&self) -> SpaceKey {
        SpaceKey::new(&self.storage_id, &self.space_id)
    }

    /// True when all three components are present
    pub fn is_complete(&self) -> bool {
        !self.storage_id.is_empty() && !self.space_id.is_empty() && !self.opaque_id.is_empty()
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}${}!{}", self.storage_id, self.space_id, self.opaque_id)
    }
}

/// Identifies one index partition: a (storage, space) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SpaceKey {
    pub storage_id: String,
    pub space_id: String,
}

impl SpaceKey {
    pub fn new(storage_id: impl Into<String>, space_id: impl Into<String>) -> Self {
        Self {
            storage_id: storage_id.into(),
            space_id: space_id.into(),
        }
    }
}

impl fmt::Display for SpaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}${}", self.storage_id, self.space_id)
    }
}

/// A resource id plus a path relative to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Reference {
    pub resource_id: ResourceId,

    /// Relative, `./`-prefixed path. `"."` or empty addresses the resource itself.
    #[serde(default)]
    pub path: String,
}

impl Reference {
    pub fn new(resource_id: ResourceId, path: impl Into<String>) -> Self {
        Self {
            resource_id,
            path: path.into(),
        }
    }
}

/// Normalise a path into the relative `./a/b` form used in references.
///
/// `"/a/b"`, `"a/b"` and `"./a/b"` all become `"./a/b"`; the root becomes `"."`.
pub fn make_relative_path(path: &str) -> String {
    let mut trimmed = path;
    while let Some(rest) = trimmed.strip_prefix("./") {
        trimmed = rest;
    }
    if trimmed == "." {
        trimmed = "";
    }
    let trimmed = trimmed.trim_matches('/');
    if trimmed.is_empty() {
        ".".to_string()
    } else {
        format!("./{}", trimmed)
    }
}

/// Join a relative base path and a relative child path
pub fn join_relative(base: &str, child: &str) -> String {
    let base = make_relative_path(base);
    let child = make_relative_path(child);
    match (base.as_str(), child.as_str()) {
        (".", _) => child,
        (_, ".") => base,
        _ => format!("{}/{}", base, &child[2..]),
    }
}

/// Strip `prefix` from `path` when `path` lies at or below it.
///
/// Both sides are compared in relative form; returns `None` when `path` is
/// outside of `prefix`.
pub fn strip_relative_prefix(path: &str, prefix: &str) -> Option<String> {
    let path = make_relative_path(path);
    let prefix = make_relative_path(prefix);
    if prefix == "." {
        return Some(path);
    }
    if path == prefix {
        return Some(".".to_string());
    }
    path.strip_prefix(&prefix)
        .filter(|rest| rest.starts_with('/'))
        .map(make_relative_path)
}

/// True when `path` is `prefix` itself or lies below it
pub fn is_within(path: &str, prefix: &str) -> bool {
    strip_relative_prefix(path, prefix).is_some()
}
