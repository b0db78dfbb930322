//! Remote drive port (driven/secondary port)
//!
//! This module defines the capability set the reconciliation engine needs
//! from the hosted file store. The primary implementation targets the
//! Drive v3 REST API, but the trait is provider-agnostic: anything that
//! offers opaque ids, parent links, per-file mtimes and content hashes,
//! a full listing, and an incremental change feed can back it.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because errors at port boundaries are
//!   adapter-specific and don't need domain-level classification.
//! - `RemoteFileMeta` is a port-level DTO, not a domain entity; the
//!   catalog layer maps it onto `Entry` rows.
//! - Modification times are parsed into `DateTime<Utc>` at the wire
//!   boundary. A descriptor that reaches the engine always carries a
//!   valid instant (or none); a malformed wire timestamp is an adapter
//!   error that aborts the pass.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Streaming body of a file download.
pub type ByteStream = Box<dyn tokio::io::AsyncRead + Send + Unpin>;

/// Descriptor of a remote object as returned by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteFileMeta {
    /// Opaque object identifier.
    pub id: String,
    /// Object name (file or folder name).
    pub name: String,
    /// MIME type; folders carry the folder sentinel type.
    pub mime_type: String,
    /// Parent object ids. The engine rejects more than one.
    pub parents: Vec<String>,
    /// MD5 of the content (hex). Absent for folders and native-app formats.
    pub md5_checksum: Option<String>,
    /// Content size in bytes (0 for folders).
    pub size: u64,
    /// Last remote modification time.
    pub modified_time: Option<DateTime<Utc>>,
    pub shared: bool,
    pub trashed: bool,
    pub explicitly_trashed: bool,
}

/// One record from the incremental change feed.
///
/// When `removed` is set the store reports nothing but the id; otherwise
/// `file` carries the full descriptor at the time of the change.
#[derive(Debug, Clone)]
pub struct RemoteChangeRecord {
    pub file_id: String,
    pub removed: bool,
    pub file: Option<RemoteFileMeta>,
}

impl RemoteChangeRecord {
    /// Returns true when the change means the object is gone: removed
    /// outright, or moved to the trash.
    pub fn is_removal(&self) -> bool {
        self.removed
            || self
                .file
                .as_ref()
                .is_some_and(|f| f.trashed || f.explicitly_trashed)
    }
}

/// One page of the incremental change feed.
#[derive(Debug, Clone)]
pub struct ChangePage {
    pub changes: Vec<RemoteChangeRecord>,
    /// Token for the next page; `None` when the feed is drained.
    pub next_page_token: Option<String>,
}

/// One page of the full file listing.
#[derive(Debug, Clone)]
pub struct FilePage {
    pub files: Vec<RemoteFileMeta>,
    pub next_page_token: Option<String>,
}

/// Port trait for remote drive operations.
///
/// ## Implementation Notes
///
/// - Every file-bearing call must request the full descriptor field set
///   (name, MIME, parents, hash, size, mtime, trash flags); the engine
///   relies on all of them being present.
/// - Transport failures and non-success responses surface as errors; the
///   engine does not retry per call, it aborts the pass and relies on the
///   pipeline being re-entrant.
#[async_trait::async_trait]
pub trait IRemoteDrive: Send + Sync {
    /// Returns the cursor at which a fresh change-feed subscription starts.
    async fn get_start_page_token(&self) -> anyhow::Result<String>;

    /// Lists changes recorded at or after `page_token`.
    async fn list_changes(&self, page_token: &str, page_size: i64) -> anyhow::Result<ChangePage>;

    /// Lists all objects, one page at a time. Used for initial catalog
    /// population; pass `None` for the first page.
    async fn list_files(
        &self,
        page_token: Option<&str>,
        page_size: i64,
    ) -> anyhow::Result<FilePage>;

    /// Fetches the root folder descriptor.
    async fn get_root(&self) -> anyhow::Result<RemoteFileMeta>;

    /// Fetches a single object descriptor by id.
    async fn get_by_id(&self, id: &str) -> anyhow::Result<RemoteFileMeta>;

    /// Opens the object's content as a byte stream.
    async fn download(&self, id: &str) -> anyhow::Result<ByteStream>;

    /// Creates an empty folder under the given parents.
    async fn create_folder(
        &self,
        name: &str,
        parent_ids: &[String],
    ) -> anyhow::Result<RemoteFileMeta>;

    /// Creates a new file with the given content.
    async fn upload_new(
        &self,
        name: &str,
        parent_ids: &[String],
        data: Vec<u8>,
    ) -> anyhow::Result<RemoteFileMeta>;

    /// Replaces the content of an existing file.
    async fn update_media(&self, id: &str, data: Vec<u8>) -> anyhow::Result<RemoteFileMeta>;

    /// Renames and/or re-parents an existing object without touching its
    /// content.
    async fn rename_move(
        &self,
        id: &str,
        name: &str,
        add_parents: &[String],
        remove_parents: &[String],
    ) -> anyhow::Result<RemoteFileMeta>;

    /// Server-side copy of `source_id` into the given parents. Used to
    /// avoid re-uploading content the store already has.
    async fn copy_file(
        &self,
        source_id: &str,
        name: &str,
        parent_ids: &[String],
    ) -> anyhow::Result<RemoteFileMeta>;

    /// Permanently deletes an object.
    async fn delete(&self, id: &str) -> anyhow::Result<()>;
}
