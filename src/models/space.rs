use crate::models::resource::{ResourceId, SpaceKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use strum::{Display, EnumString};

/// Role of a storage space as seen by the requesting user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SpaceKind {
    /// The user's own home space
    Personal,
    /// A shared project (drive) space the user is a member of
    Project,
    /// A share as stored at the owner's side
    Grant,
    /// The same share as it appears in the recipient's namespace
    Mountpoint,
}

/// Textual space identifier of the form `<storage>$<space>!<opaque>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SpaceId {
    pub storage_id: String,
    pub space_id: String,
    pub opaque_id: String,
}

impl SpaceId {
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

    /// The root resource of the space
    pub fn root(&self) -> ResourceId {
        ResourceId::new(&self.storage_id, &self.space_id, &self.opaque_id)
    }

    pub fn space_key(&self) -> SpaceKey {
        SpaceKey::new(&self.storage_id, &self.space_id)
    }
}

/// Error returned when a space id string is malformed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed space id '{0}', expected <storage>$<space>[!<opaque>]")]
pub struct ParseSpaceIdError(pub String);

impl FromStr for SpaceId {
    type Err = ParseSpaceIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (storage_id, rest) = s
            .split_once('$')
            .ok_or_else(|| ParseSpaceIdError(s.to_string()))?;
        let (space_id, opaque_id) = match rest.split_once('!') {
            Some((space, opaque)) => (space, opaque),
            None => (rest, rest),
        };

        if storage_id.is_empty() || space_id.is_empty() || opaque_id.is_empty() {
            return Err(ParseSpaceIdError(s.to_string()));
        }

        Ok(Self::new(storage_id, space_id, opaque_id))
    }
}

impl TryFrom<String> for SpaceId {
    type Error = ParseSpaceIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SpaceId> for String {
    fn from(id: SpaceId) -> Self {
        id.to_string()
    }
}

impl fmt::Display for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}${}!{}", self.storage_id, self.space_id, self.opaque_id)
    }
}

/// A storage space visible to a user, read fresh for every request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpaceDescriptor {
    pub id: SpaceId,
    pub root: ResourceId,
    pub owner: UserId,
    pub kind: SpaceKind,
    pub name: String,

    /// Root of the backing grant; only set for mountpoints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant: Option<ResourceId>,
}

impl SpaceDescriptor {
    pub fn new(root: ResourceId, owner: UserId, kind: SpaceKind, name: impl Into<String>) -> Self {
        Self {
            id: SpaceId::new(&root.storage_id, &root.space_id, &root.opaque_id),
            root,
            owner,
            kind,
            name: name.into(),
            grant: None,
        }
    }

    /// Mountpoint mirroring the grant rooted at `grant`
    pub fn mountpoint(
        root: ResourceId,
        owner: UserId,
        name: impl Into<String>,
        grant: ResourceId,
    ) -> Self {
        Self {
            grant: Some(grant),
            ..Self::new(root, owner, SpaceKind::Mountpoint, name)
        }
    }

    pub fn space_key(&self) -> SpaceKey {
        self.root.space_key()
    }

    /// Personal and project spaces are searched as they are
    pub fn is_direct(&self) -> bool {
        matches!(self.kind, SpaceKind::Personal | SpaceKind::Project)
    }
}

/// Opaque identity of a user
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_space_id() {
        let id: SpaceId = "storageid$personalspace!personalspace".parse().unwrap();
        assert_eq!(id.storage_id, "storageid");
        assert_eq!(id.space_id, "personalspace");
        assert_eq!(id.opaque_id, "personalspace");
        assert_eq!(id.to_string(), "storageid$personalspace!personalspace");
    }

    #[test]
    fn test_parse_space_id_without_opaque() {
        let id: SpaceId = "storageid$spaceid".parse().unwrap();
        assert_eq!(id.opaque_id, "spaceid");
    }

    #[test]
    fn test_parse_malformed_space_id() {
        assert!("nodollar".parse::<SpaceId>().is_err());
        assert!("$space!opaque".parse::<SpaceId>().is_err());
        assert!("storage$!opaque".parse::<SpaceId>().is_err());
    }

    #[test]
    fn test_space_kind_strings() {
        assert_eq!(SpaceKind::Mountpoint.to_string(), "mountpoint");
        assert_eq!("grant".parse::<SpaceKind>().unwrap(), SpaceKind::Grant);
    }

    #[test]
    fn test_space_id_serde_roundtrip_is_textual() {
        let id = SpaceId::new("s", "sp", "o");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"s$sp!o\"");
    }
}
