use crate::models::resource::ResourceId;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// File or folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ResourceType {
    #[default]
    File,
    Folder,
}

/// Content and metadata produced by an extractor for one resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentBody {
    pub title: Option<String>,
    pub content: String,
    pub mime_type: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// The indexed representation of one live resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Upsert key
    pub id: ResourceId,

    /// Root of the space the resource belongs to
    pub root: ResourceId,

    pub parent_id: Option<ResourceId>,

    /// Path relative to the space root, `./`-prefixed
    pub path: String,

    pub name: String,
    pub size: u64,
    pub mtime: DateTime<Utc>,
    pub resource_type: ResourceType,

    #[serde(flatten)]
    pub body: DocumentBody,
}

impl Document {
    /// Modification time truncated to whole seconds, the resolution every backend stores
    pub fn mtime_secs(&self) -> i64 {
        self.mtime.timestamp()
    }

    pub fn is_folder(&self) -> bool {
        self.resource_type == ResourceType::Folder
    }
}

/// Convert unix seconds into a UTC timestamp, clamping invalid values to the epoch
pub fn timestamp_from_secs(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
