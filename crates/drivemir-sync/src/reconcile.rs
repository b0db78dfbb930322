//! Catalog → local applier
//!
//! Traverses the catalog depth-first in current-parent order starting at
//! the root, producing every entry exactly once with its previous and
//! current paths resolved. For each entry two change classifications are
//! computed independently — local and remote — and the action is selected
//! from their cross product:
//!
//! | local \ remote | NotChanged        | Updated  | Moved            | Deleted |
//! |----------------|-------------------|----------|------------------|---------|
//! | NotExist       | download / mkdir  | download | download / mkdir | noop    |
//! | NotChanged     | anchor time       | download | rename   | remove  |
//! | Updated        | upload            | conflict | conflict | conflict|
//! | Deleted        | defer (move-det.) | conflict | download | forget  |
//!
//! The local side is probed at the entry's *previous* path — that is
//! where the last applied state put the local copy; for an unmoved entry
//! the two paths coincide.
//!
//! Conflicts are logged at warning severity and left untouched on both
//! sides; a future pass resolves them once one side settles.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use drivemir_catalog::Catalog;
use drivemir_core::domain::{Entry, LocalChange, RemoteChange, TrackedEntry};
use drivemir_core::ports::{ByteStream, IRemoteDrive};

use crate::hasher::md5_of_file;

/// Applies remote-side changes recorded in the catalog to the local tree.
pub struct LocalReconciler {
    drive: Arc<dyn IRemoteDrive>,
    catalog: Arc<Catalog>,
    drive_path: PathBuf,
}

impl LocalReconciler {
    pub fn new(drive: Arc<dyn IRemoteDrive>, catalog: Arc<Catalog>, drive_path: PathBuf) -> Self {
        Self {
            drive,
            catalog,
            drive_path,
        }
    }

    /// Traverses the catalog and applies the reconciling action per entry.
    ///
    /// The traversal runs as a producer task; this consumer applies each
    /// entry and sends a done-signal back before the producer may continue,
    /// keeping catalog writes strictly serialized behind the traversal.
    pub async fn apply_remote_changes(&self) -> Result<()> {
        let (tx, mut rx) = mpsc::channel::<TrackedEntry>(1);
        let (done_tx, done_rx) = mpsc::channel::<()>(1);

        let catalog = self.catalog.clone();
        let producer = tokio::spawn(async move { traverse_catalog(catalog, tx, done_rx).await });

        while let Some(tracked) = rx.recv().await {
            debug!(
                path = %tracked.cur_path.display(),
                mime = %tracked.entry.mime_type,
                "traversing over remote entries"
            );
            let applied = self.apply(&tracked).await;
            done_tx.send(()).await.ok();
            applied.with_context(|| {
                format!("could not reconcile {}", tracked.cur_path.display())
            })?;
        }

        producer.await.context("catalog traversal panicked")??;
        Ok(())
    }

    // ========================================================================
    // Classification
    // ========================================================================

    async fn classify_remote(&self, tracked: &TrackedEntry) -> Result<RemoteChange> {
        let trashed_ancestor = self
            .catalog
            .has_trashed_ancestor(&tracked.entry.id)
            .await
            .context("could not check for a trashed ancestor")?;
        Ok(classify_remote_entry(tracked, trashed_ancestor))
    }

    // ========================================================================
    // Action dispatch
    // ========================================================================

    async fn apply(&self, tracked: &TrackedEntry) -> Result<()> {
        // The local copy of an entry lives where the *last applied* state
        // put it, which is the previous path when the remote moved it.
        let local_probe = self.full_path(&tracked.prev_path);
        let local = classify_local_entry(tracked, &local_probe).await?;
        let remote = self.classify_remote(tracked).await?;

        if local != LocalChange::NotChanged || remote != RemoteChange::NotChanged {
            debug!(
                id = %tracked.entry.id,
                path = %tracked.cur_path.display(),
                local = %local,
                remote = %remote,
                "classified entry"
            );
        }

        if tracked.entry.is_folder() {
            return self.apply_folder(tracked, local, remote).await;
        }
        if !tracked.entry.is_downloadable() {
            // Native-app formats have no byte representation; metadata only.
            return Ok(());
        }
        self.apply_file(tracked, local, remote).await
    }

    async fn apply_folder(
        &self,
        tracked: &TrackedEntry,
        local: LocalChange,
        remote: RemoteChange,
    ) -> Result<()> {
        use LocalChange as L;
        use RemoteChange as R;

        let entry = &tracked.entry;
        match (local, remote) {
            // A never-realized folder has nothing to rename; create it
            // at its new path so children can land inside it.
            (L::NotExist, R::Moved) => self.create_folder_locally(tracked).await,
            (_, R::Moved) => self.apply_move(tracked).await,

            (L::Deleted, R::Updated) => {
                self.log_conflict(tracked, local, remote);
                Ok(())
            }
            (L::Deleted, R::NotChanged) => {
                debug!(
                    id = %entry.id,
                    path = %tracked.cur_path.display(),
                    "folder gone locally, deferring remote deletion for move detection"
                );
                self.catalog
                    .set_removed_locally(&entry.id, true)
                    .await
                    .context("could not flag entry as removed locally")
            }
            (_, R::Deleted) => self.apply_remote_removal(tracked).await,

            (L::NotExist, R::NotChanged) | (L::NotExist, R::Updated) | (L::NotChanged, R::Updated) => {
                self.create_folder_locally(tracked).await
            }
            (L::NotChanged, R::NotChanged) => {
                if entry.download_time.is_none() {
                    let full = self.full_path(&tracked.cur_path);
                    self.anchor_download_time(&entry.id, &full).await?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn apply_file(
        &self,
        tracked: &TrackedEntry,
        local: LocalChange,
        remote: RemoteChange,
    ) -> Result<()> {
        use LocalChange as L;
        use RemoteChange as R;

        let entry = &tracked.entry;
        match (local, remote) {
            (L::NotExist, R::NotChanged) | (L::NotExist, R::Updated) => {
                self.download(tracked).await
            }
            // Never realized locally; fetch it at its new location.
            (L::NotExist, R::Moved) => self.download(tracked).await,
            (L::NotExist, R::Deleted) => Ok(()),

            (L::NotChanged, R::NotChanged) => {
                if entry.download_time.is_none() {
                    let full = self.full_path(&tracked.cur_path);
                    self.anchor_download_time(&entry.id, &full).await?;
                }
                Ok(())
            }
            (L::NotChanged, R::Updated) => self.download(tracked).await,
            (L::NotChanged, R::Moved) => self.apply_move(tracked).await,
            (L::NotChanged, R::Deleted) => {
                let full = self.full_path(&tracked.cur_path);
                debug!(path = %full.display(), "deleting file locally (removed remotely)");
                tokio::fs::remove_file(&full)
                    .await
                    .with_context(|| format!("could not delete {}", full.display()))
            }

            (L::Updated, R::NotChanged) => self.upload(tracked).await,
            (L::Updated, _) => {
                self.log_conflict(tracked, local, remote);
                Ok(())
            }

            (L::Deleted, R::NotChanged) => {
                debug!(
                    id = %entry.id,
                    "file gone locally, deferring remote deletion for move detection"
                );
                self.catalog
                    .set_removed_locally(&entry.id, true)
                    .await
                    .context("could not flag entry as removed locally")
            }
            (L::Deleted, R::Updated) => {
                self.log_conflict(tracked, local, remote);
                Ok(())
            }
            // The moved file was deleted locally: recreate it at its new path.
            (L::Deleted, R::Moved) => self.download(tracked).await,
            (L::Deleted, R::Deleted) => self
                .catalog
                .delete(&entry.id)
                .await
                .context("could not forget entry deleted on both sides"),
        }
    }

    fn log_conflict(&self, tracked: &TrackedEntry, local: LocalChange, remote: RemoteChange) {
        warn!(
            id = %tracked.entry.id,
            path = %tracked.cur_path.display(),
            local = %local,
            remote = %remote,
            "conflicting local and remote changes, leaving both sides untouched"
        );
    }

    // ========================================================================
    // Actions
    // ========================================================================

    /// Streams the remote content to the current path in 1 KiB chunks.
    /// On any read or write error the partial file is removed before the
    /// error surfaces. After success the local mtime mirrors the remote
    /// one and `download_time` is re-anchored from stat.
    async fn download(&self, tracked: &TrackedEntry) -> Result<()> {
        let entry = &tracked.entry;
        let full = self.full_path(&tracked.cur_path);
        debug!(path = %full.display(), id = %entry.id, size = entry.size_bytes, "downloading file");

        let mut reader = self
            .drive
            .download(&entry.id)
            .await
            .with_context(|| format!("could not open download stream for {}", entry.id))?;

        let file = tokio::fs::File::create(&full)
            .await
            .with_context(|| format!("could not create {}", full.display()))?;

        if let Err(err) = copy_stream(&mut reader, file).await {
            if let Err(rm_err) = tokio::fs::remove_file(&full).await {
                warn!(path = %full.display(), error = %rm_err, "could not remove partial download");
            }
            return Err(err).with_context(|| format!("could not download file {}", entry.id));
        }

        if let Some(mtime) = entry.cur_remote_mtime {
            set_file_mtime(&full, mtime)
                .with_context(|| format!("could not set mtime on {}", full.display()))?;
        }

        self.anchor_download_time(&entry.id, &full).await?;
        self.catalog.promote_prev_to_cur(&entry.id).await?;
        Ok(())
    }

    /// Pushes locally updated content to the remote.
    ///
    /// Probes content equality first: when the local bytes already match
    /// the remote hash the body transfer is skipped and only
    /// `download_time` is reconciled (the file most probably predates the
    /// catalog). Otherwise the media is replaced and the response mtime
    /// recorded as the last-applied remote snapshot.
    async fn upload(&self, tracked: &TrackedEntry) -> Result<()> {
        let entry = &tracked.entry;
        let full = self.full_path(&tracked.cur_path);

        if is_local_same_as_remote(entry, &full).await? {
            debug!(id = %entry.id, "local content already matches remote, reconciling download time");
            return self.anchor_download_time(&entry.id, &full).await;
        }

        debug!(path = %full.display(), id = %entry.id, "uploading updated file");
        let data = tokio::fs::read(&full)
            .await
            .with_context(|| format!("could not read {} for upload", full.display()))?;

        let meta = self
            .drive
            .update_media(&entry.id, data)
            .await
            .with_context(|| format!("could not update file {} remotely", entry.id))?;

        if let Some(mtime) = meta.modified_time {
            self.catalog.set_prev_remote_mtime(&entry.id, mtime).await?;
        }
        self.anchor_download_time(&entry.id, &full).await?;
        Ok(())
    }

    /// Creates the folder at its current path, tolerating one that is
    /// already there, then anchors `download_time` and promotes.
    async fn create_folder_locally(&self, tracked: &TrackedEntry) -> Result<()> {
        let entry = &tracked.entry;
        let full = self.full_path(&tracked.cur_path);
        debug!(name = %entry.cur_remote_name, "creating folder");

        match tokio::fs::create_dir(&full).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(e).with_context(|| format!("could not create dir {}", full.display()))
            }
        }

        self.anchor_download_time(&entry.id, &full).await?;
        self.catalog.promote_prev_to_cur(&entry.id).await?;
        Ok(())
    }

    /// Renames `prev_path` to `cur_path`, but only when the destination
    /// does not exist yet. Either way the entry is promoted and its
    /// `download_time` re-anchored to the destination's stat.
    async fn apply_move(&self, tracked: &TrackedEntry) -> Result<()> {
        let entry = &tracked.entry;
        let prev_full = self.full_path(&tracked.prev_path);
        let cur_full = self.full_path(&tracked.cur_path);

        let cur_exists = tokio::fs::try_exists(&cur_full).await.unwrap_or(false);
        if !cur_exists {
            if !tokio::fs::try_exists(&prev_full).await.unwrap_or(false) {
                // Neither side present; a later pass will download.
                return Ok(());
            }
            debug!(
                from = %prev_full.display(),
                to = %cur_full.display(),
                "moving entry to its new path"
            );
            tokio::fs::rename(&prev_full, &cur_full)
                .await
                .with_context(|| {
                    format!(
                        "could not rename {} to {}",
                        prev_full.display(),
                        cur_full.display()
                    )
                })?;
        }

        self.catalog.promote_prev_to_cur(&entry.id).await?;
        self.anchor_download_time(&entry.id, &cur_full).await?;
        Ok(())
    }

    /// Removes the local file or directory of an entry that is gone
    /// remotely, then forgets the entry.
    async fn apply_remote_removal(&self, tracked: &TrackedEntry) -> Result<()> {
        let full = self.full_path(&tracked.cur_path);
        debug!(path = %full.display(), "removing local entry (removed remotely)");

        match tokio::fs::metadata(&full).await {
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| format!("could not stat {}", full.display()))
            }
            Ok(meta) if meta.is_dir() => {
                tokio::fs::remove_dir_all(&full)
                    .await
                    .with_context(|| format!("could not remove dir {}", full.display()))?;
            }
            Ok(_) => {
                tokio::fs::remove_file(&full)
                    .await
                    .with_context(|| format!("could not remove {}", full.display()))?;
            }
        }

        self.catalog.delete(&tracked.entry.id).await?;
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn full_path(&self, rel: &Path) -> PathBuf {
        self.drive_path.join(rel)
    }

    /// Records the file's current mtime as its `download_time`.
    async fn anchor_download_time(&self, id: &str, full: &Path) -> Result<()> {
        let meta = tokio::fs::metadata(full)
            .await
            .with_context(|| format!("could not stat {}", full.display()))?;
        let mtime: DateTime<Utc> = meta
            .modified()
            .with_context(|| format!("no mtime available for {}", full.display()))?
            .into();
        self.catalog
            .set_download_time(id, mtime)
            .await
            .context("could not record download time")?;
        Ok(())
    }
}

// ============================================================================
// Classification functions
// ============================================================================

/// Classifies the local side of an entry by examining the file at the
/// given probe path (the previous path for entries the remote moved).
///
/// `download_time` being unset means the local side never realized the
/// entry, so an existing file is judged by content (it probably predates
/// the catalog); a set `download_time` is compared against the stat mtime
/// with one-second granularity, because many filesystems truncate mtimes
/// to seconds.
pub(crate) async fn classify_local_entry(
    tracked: &TrackedEntry,
    full_path: &Path,
) -> Result<LocalChange> {
    let entry = &tracked.entry;

    let meta = match tokio::fs::metadata(full_path).await {
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Ok(if entry.download_time.is_none() {
                LocalChange::NotExist
            } else {
                LocalChange::Deleted
            });
        }
        Err(e) => {
            return Err(e).with_context(|| format!("could not stat {}", full_path.display()))
        }
        Ok(meta) => meta,
    };

    // Folders are present or absent; content changes belong to their files.
    if entry.is_folder() {
        return Ok(LocalChange::NotChanged);
    }

    match entry.download_time {
        None => {
            if is_local_same_as_remote(entry, full_path).await? {
                Ok(LocalChange::NotChanged)
            } else {
                Ok(LocalChange::Updated)
            }
        }
        Some(download_time) => {
            let mtime: DateTime<Utc> = meta
                .modified()
                .with_context(|| format!("no mtime available for {}", full_path.display()))?
                .into();
            if download_time.timestamp() == mtime.timestamp() {
                Ok(LocalChange::NotChanged)
            } else {
                Ok(LocalChange::Updated)
            }
        }
    }
}

/// Classifies the remote side of an entry from its catalog snapshots.
pub(crate) fn classify_remote_entry(
    tracked: &TrackedEntry,
    has_trashed_ancestor: bool,
) -> RemoteChange {
    let entry = &tracked.entry;
    if has_trashed_ancestor || entry.removed_remotely || entry.trashed {
        RemoteChange::Deleted
    } else if tracked.was_moved() {
        RemoteChange::Moved
    } else if entry.cur_remote_mtime != entry.prev_remote_mtime {
        RemoteChange::Updated
    } else {
        RemoteChange::NotChanged
    }
}

/// Checks whether the local file's content equals the remote hash.
/// Directories always count as equal; a missing file never does.
async fn is_local_same_as_remote(entry: &Entry, full_path: &Path) -> Result<bool> {
    let meta = match tokio::fs::metadata(full_path).await {
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => {
            return Err(e).with_context(|| format!("could not stat {}", full_path.display()))
        }
        Ok(meta) => meta,
    };
    if meta.is_dir() {
        return Ok(true);
    }

    let local_hash = md5_of_file(full_path).await?;
    debug!(path = %full_path.display(), hash = %local_hash, "calculated local hash");
    Ok(local_hash == entry.hash)
}

/// Copies the download stream into the file in 1 KiB chunks.
async fn copy_stream(reader: &mut ByteStream, mut file: tokio::fs::File) -> Result<()> {
    let mut buf = [0u8; 1024];
    loop {
        let n = reader
            .read(&mut buf)
            .await
            .context("could not read a chunk")?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n])
            .await
            .context("could not write a chunk")?;
    }
    file.flush().await.context("could not flush file")?;
    Ok(())
}

fn set_file_mtime(path: &Path, mtime: DateTime<Utc>) -> Result<()> {
    let file = std::fs::File::options().write(true).open(path)?;
    file.set_modified(mtime.into())?;
    Ok(())
}

// ============================================================================
// Traversal
// ============================================================================

/// Emits every catalog entry depth-first in current-parent order, root
/// first, children ordered by current remote name. Waits for a done-signal
/// after each emitted entry so the consumer's catalog writes complete
/// before traversal continues.
async fn traverse_catalog(
    catalog: Arc<Catalog>,
    tx: mpsc::Sender<TrackedEntry>,
    mut done_rx: mpsc::Receiver<()>,
) -> Result<()> {
    let Some(root) = catalog.get_root().await? else {
        return Ok(());
    };

    let root_id = root.id.clone();
    let tracked = TrackedEntry {
        prev_path: PathBuf::from(&root.prev_remote_name),
        cur_path: PathBuf::from(&root.cur_remote_name),
        entry: root,
    };
    if tx.send(tracked).await.is_err() {
        return Ok(());
    }
    if done_rx.recv().await.is_none() {
        return Ok(());
    }

    traverse_children(&catalog, &root_id, &tx, &mut done_rx).await
}

fn traverse_children<'a>(
    catalog: &'a Catalog,
    parent_id: &'a str,
    tx: &'a mpsc::Sender<TrackedEntry>,
    done_rx: &'a mut mpsc::Receiver<()>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let children = catalog
            .children_of(parent_id)
            .await
            .with_context(|| format!("could not get children of {parent_id}"))?;

        for child in children {
            let Some(paths) = catalog.parent_paths(&child.id).await? else {
                // The entry or one of its ancestors is already gone from
                // the catalog; cleanup collects the leftovers.
                continue;
            };

            let prev_path = rel_path(&paths.prev, &child.prev_remote_name);
            let cur_path = rel_path(&paths.cur, &child.cur_remote_name);
            let child_id = child.id.clone();

            let tracked = TrackedEntry {
                entry: child,
                prev_path,
                cur_path,
            };
            if tx.send(tracked).await.is_err() {
                return Ok(());
            }
            if done_rx.recv().await.is_none() {
                return Ok(());
            }

            traverse_children(catalog, &child_id, tx, done_rx).await?;
        }

        Ok(())
    })
}

/// Joins a `/`-separated parent path and a name into an OS path.
fn rel_path(parent: &str, name: &str) -> PathBuf {
    let mut path: PathBuf = parent.split('/').collect();
    path.push(name);
    path
}
