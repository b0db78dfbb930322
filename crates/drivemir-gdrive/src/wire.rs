//! Drive v3 wire DTOs
//!
//! JSON shapes as the API returns them, plus the mapping onto the
//! port-level descriptors. Modification times are parsed here, at the
//! wire boundary: a descriptor that reaches the engine always carries a
//! valid instant or none at all.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use drivemir_core::ports::{RemoteChangeRecord, RemoteFileMeta};

use crate::DriveError;

/// Field selection requested on every file-bearing call.
pub const FILE_FIELDS: &str =
    "id,name,mimeType,parents,shared,md5Checksum,size,modifiedTime,trashed,explicitlyTrashed";

/// A `files` resource.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileResource {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub md5_checksum: Option<String>,
    /// int64 serialized as a JSON string, absent for folders.
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub modified_time: Option<String>,
    #[serde(default)]
    pub shared: bool,
    #[serde(default)]
    pub trashed: bool,
    #[serde(default)]
    pub explicitly_trashed: bool,
}

impl FileResource {
    /// Maps the wire resource onto the port descriptor, parsing the
    /// mtime and size. A malformed timestamp or size is a decode error.
    pub fn into_meta(self) -> Result<RemoteFileMeta, DriveError> {
        let modified_time = match self.modified_time {
            Some(ref raw) => Some(parse_mtime(raw)?),
            None => None,
        };
        let size = match self.size {
            Some(ref raw) => raw.parse::<u64>().map_err(|e| {
                DriveError::Decode(format!("bad size '{}' for {}: {}", raw, self.id, e))
            })?,
            None => 0,
        };

        Ok(RemoteFileMeta {
            id: self.id,
            name: self.name,
            mime_type: self.mime_type,
            parents: self.parents,
            md5_checksum: self.md5_checksum,
            size,
            modified_time,
            shared: self.shared,
            trashed: self.trashed,
            explicitly_trashed: self.explicitly_trashed,
        })
    }
}

/// One element of a `changes.list` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeResource {
    pub file_id: String,
    #[serde(default)]
    pub removed: bool,
    #[serde(default)]
    pub file: Option<FileResource>,
}

impl ChangeResource {
    pub fn into_record(self) -> Result<RemoteChangeRecord, DriveError> {
        let file = match self.file {
            Some(resource) => Some(resource.into_meta()?),
            None => None,
        };
        Ok(RemoteChangeRecord {
            file_id: self.file_id,
            removed: self.removed,
            file,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileListResponse {
    #[serde(default)]
    pub next_page_token: Option<String>,
    #[serde(default)]
    pub files: Vec<FileResource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeListResponse {
    #[serde(default)]
    pub next_page_token: Option<String>,
    #[serde(default)]
    pub changes: Vec<ChangeResource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPageTokenResponse {
    pub start_page_token: String,
}

fn parse_mtime(raw: &str) -> Result<DateTime<Utc>, DriveError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DriveError::Decode(format!("bad modifiedTime '{raw}': {e}")))
}
