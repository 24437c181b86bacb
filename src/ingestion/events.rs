//! Storage lifecycle events

use crate::models::{ResourceId, SpaceId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A change in storage the index has to follow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LifecycleEvent {
    /// Upload processing finished, the file content is final
    PostprocessingFinished {
        space_id: SpaceId,
        owner: UserId,
        resource_id: ResourceId,
    },

    /// File created empty or its metadata changed
    FileTouched {
        space_id: SpaceId,
        owner: UserId,
        resource_id: ResourceId,
    },

    /// Folder created
    ContainerCreated {
        space_id: SpaceId,
        owner: UserId,
        resource_id: ResourceId,
    },

    /// An older version of a file became current
    FileVersionRestored {
        space_id: SpaceId,
        owner: UserId,
        resource_id: ResourceId,
    },

    /// Resource moved to the trash bin
    ItemTrashed {
        space_id: SpaceId,
        resource_id: ResourceId,
    },

    /// Resource restored from the trash bin
    ItemRestored {
        space_id: SpaceId,
        owner: UserId,
        resource_id: ResourceId,
    },

    /// Resource moved or renamed
    ItemMoved {
        space_id: SpaceId,
        owner: UserId,
        resource_id: ResourceId,
    },

    /// Space shared with a member
    SpaceShared {
        space_id: SpaceId,
        owner: UserId,
    },

    /// Space membership removed
    SpaceUnshared { space_id: SpaceId },

    /// Space membership ran out
    SpaceMembershipExpired { space_id: SpaceId },

    /// Resource shared with another user
    ShareCreated {
        space_id: SpaceId,
        owner: UserId,
        resource_id: ResourceId,
    },

    /// Share removed
    ShareRemoved {
        space_id: SpaceId,
        resource_id: ResourceId,
    },

    /// Share ran out
    ShareExpired {
        space_id: SpaceId,
        resource_id: ResourceId,
    },

    /// Space enabled, or re-enabled after being disabled
    SpaceEnabled { space_id: SpaceId, owner: UserId },

    /// Space disabled; its documents must no longer be found
    SpaceDisabled { space_id: SpaceId },

    /// Space deleted for good
    SpaceDeleted { space_id: SpaceId },
}

impl LifecycleEvent {
    /// Space the event belongs to
    pub fn space_id(&self) -> &SpaceId {
        match self {
            LifecycleEvent::PostprocessingFinished { space_id, .. }
            | LifecycleEvent::FileTouched { space_id, .. }
            | LifecycleEvent::ContainerCreated { space_id, .. }
            | LifecycleEvent::FileVersionRestored { space_id, .. }
            | LifecycleEvent::ItemTrashed { space_id, .. }
            | LifecycleEvent::ItemRestored { space_id, .. }
            | LifecycleEvent::ItemMoved { space_id, .. }
            | LifecycleEvent::SpaceShared { space_id, .. }
            | LifecycleEvent::SpaceUnshared { space_id }
            | LifecycleEvent::SpaceMembershipExpired { space_id }
            | LifecycleEvent::ShareCreated { space_id, .. }
            | LifecycleEvent::ShareRemoved { space_id, .. }
            | LifecycleEvent::ShareExpired { space_id, .. }
            | LifecycleEvent::SpaceEnabled { space_id, .. }
            | LifecycleEvent::SpaceDisabled { space_id }
            | LifecycleEvent::SpaceDeleted { space_id } => space_id,
        }
    }

    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            LifecycleEvent::PostprocessingFinished { .. } => "PostprocessingFinished",
            LifecycleEvent::FileTouched { .. } => "FileTouched",
            LifecycleEvent::ContainerCreated { .. } => "ContainerCreated",
            LifecycleEvent::FileVersionRestored { .. } => "FileVersionRestored",
            LifecycleEvent::ItemTrashed { .. } => "ItemTrashed",
            LifecycleEvent::ItemRestored { .. } => "ItemRestored",
            LifecycleEvent::ItemMoved { .. } => "ItemMoved",
            LifecycleEvent::SpaceShared { .. } => "SpaceShared",
            LifecycleEvent::SpaceUnshared { .. } => "SpaceUnshared",
            LifecycleEvent::SpaceMembershipExpired { .. } => "SpaceMembershipExpired",
            LifecycleEvent::ShareCreated { .. } => "ShareCreated",
            LifecycleEvent::ShareRemoved { .. } => "ShareRemoved",
            LifecycleEvent::ShareExpired { .. } => "ShareExpired",
            LifecycleEvent::SpaceEnabled { .. } => "SpaceEnabled",
            LifecycleEvent::SpaceDisabled { .. } => "SpaceDisabled",
            LifecycleEvent::SpaceDeleted { .. } => "SpaceDeleted",
        }
    }
}

/// Event metadata carried on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

impl Default for EventMetadata {
    fn default() -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            source: "space-search".to_string(),
        }
    }
}

/// Envelope wrapping an event with its metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(default)]
    pub metadata: EventMetadata,
    pub event: LifecycleEvent,
}

impl EventEnvelope {
    pub fn new(event: LifecycleEvent) -> Self {
        Self {
            metadata: EventMetadata::default(),
            event,
        }
    }
}
