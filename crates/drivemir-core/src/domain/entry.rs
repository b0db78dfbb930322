//! Catalog entry — the per-object record mirrored from the remote drive
//!
//! Every known remote object (file or folder) has exactly one [`Entry`].
//! Each entry carries *two* snapshots of the remote state:
//!
//! - `cur_*` fields: the state as of the most recent observation of the
//!   change feed (what the remote looks like now).
//! - `prev_*` fields: the state as of the most recent *successfully applied*
//!   local action (what the local mirror reflects).
//!
//! Change classification compares the two snapshots: a `prev`/`cur`
//! divergence means the remote changed since the last apply. Promotion
//! (`prev ← cur`) happens only after the corresponding local action
//! succeeded, so an interrupted pass reclassifies correctly on restart.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

/// The sentinel MIME type the remote uses for folders.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Prefix shared by all native-app formats. Files with such a MIME type
/// have no byte representation and cannot be downloaded.
const NATIVE_APP_MIME_PREFIX: &str = "application/vnd.google-apps";

/// One row of the catalog: a known remote object and its sync bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// Opaque identifier assigned by the remote store.
    pub id: String,
    /// Remote filename as of the last successful local apply.
    pub prev_remote_name: String,
    /// Remote filename as of the last change-feed observation.
    pub cur_remote_name: String,
    /// Remote content hash (MD5 hex). Empty for folders and for formats
    /// that expose no hash.
    pub hash: String,
    /// Local mtime recorded the last time local content was written from
    /// the remote (or uploaded, normalized to the local file's mtime).
    /// `None` means the local side has never realized this entry.
    pub download_time: Option<DateTime<Utc>>,
    /// Remote mtime as of the last successful local apply.
    pub prev_remote_mtime: Option<DateTime<Utc>>,
    /// Remote mtime as of the last change-feed observation.
    pub cur_remote_mtime: Option<DateTime<Utc>>,
    /// MIME type. Folders carry [`FOLDER_MIME_TYPE`].
    pub mime_type: String,
    pub shared: bool,
    /// Exactly one entry in the catalog has this set.
    pub root_folder: bool,
    pub trashed: bool,
    pub removed_remotely: bool,
    /// The local filesystem no longer has the entry, but the remote
    /// deletion is deferred until move detection had a chance to reclaim it.
    pub removed_locally: bool,
    pub size_bytes: u64,
}

impl Entry {
    /// Returns true if this entry is a folder.
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }

    /// Returns true if the entry's content can be downloaded as bytes.
    ///
    /// Native-app documents (docs, sheets, ...) expose metadata but no
    /// byte stream; they are tracked in the catalog and otherwise skipped.
    pub fn is_downloadable(&self) -> bool {
        !self.mime_type.starts_with(NATIVE_APP_MIME_PREFIX)
    }
}

/// An [`Entry`] paired with its resolved paths, as produced by the
/// catalog traversal.
///
/// Both paths are relative to the drive mount point and include the root
/// folder's name as their first component. `prev_path` joins the previous
/// ancestor names, `cur_path` the current ones; the two differ exactly
/// when the entry (or an ancestor) was renamed or re-parented remotely.
#[derive(Debug, Clone)]
pub struct TrackedEntry {
    pub entry: Entry,
    pub prev_path: PathBuf,
    pub cur_path: PathBuf,
}

impl TrackedEntry {
    /// Returns true when the previous and current paths diverge.
    pub fn was_moved(&self) -> bool {
        self.prev_path != self.cur_path
    }
}
