//! Represents an uploaded object and the sidecar record persisted next to it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// Fallback content type when a sidecar carries none.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Metadata record stored as `<id>.json` beside the content file.
///
/// The serialized key names (`fileName`, `mimetype`, `uploadDate`) match
/// stores written by earlier deployments; the `storedName`, `mimeType` and
/// `createdAt` spellings are accepted when reading.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ObjectRecord {
    /// Opaque unique identifier, assigned at creation.
    pub id: String,

    /// Client-supplied file name. Display only, never used as a path.
    #[serde(rename = "originalName")]
    pub original_name: String,

    /// On-disk content file name inside the store root.
    #[serde(rename = "fileName", alias = "storedName")]
    pub stored_name: String,

    /// Byte length as reported at upload time.
    pub size: u64,

    /// Client-supplied content type (advisory).
    #[serde(rename = "mimetype", alias = "mimeType", default = "default_mime_type")]
    pub mime_type: String,

    /// Creation timestamp, set once.
    #[serde(rename = "uploadDate", alias = "createdAt")]
    pub created_at: DateTime<Utc>,

    /// Caller-supplied extension fields, persisted verbatim at the top level.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_mime_type() -> String {
    DEFAULT_MIME_TYPE.to_string()
}

/// Caller-declared description of an incoming upload.
#[derive(Clone, Debug, Default)]
pub struct ObjectUpload {
    /// Declared file name; its extension is carried onto the stored name.
    pub name: String,

    /// Declared byte length. When absent the written length is recorded.
    pub size: Option<u64>,

    /// Declared content type.
    pub mime_type: String,

    /// Extension fields merged into the record.
    pub extra: Map<String, Value>,
}

impl ObjectUpload {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: None,
            mime_type: mime_type.into(),
            extra: Map::new(),
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// A live object: its record plus the resolved content path.
#[derive(Clone, Debug)]
pub struct StoredObject {
    pub record: ObjectRecord,
    pub path: PathBuf,
}

/// Aggregate figures over every listed record.
#[derive(Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoreUsage {
    pub objects: usize,
    pub total_bytes: u64,
}
