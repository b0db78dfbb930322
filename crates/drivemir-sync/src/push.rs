//! Local → remote applier
//!
//! Walks the local tree rooted at `drive_path/<root name>` in sorted
//! pre-order and promotes everything the catalog does not know yet:
//! new folders are created remotely (unless move detection reclaims a
//! locally removed one), new files are uploaded — or realized with a
//! server-side copy when the store already has identical content.
//!
//! A stack of remote parent ids keyed by depth tracks the current
//! position: before each node the stack is truncated to the node's
//! ancestor count, making the top the node's remote parent.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info};
use walkdir::WalkDir;

use drivemir_catalog::Catalog;
use drivemir_core::domain::Entry;
use drivemir_core::ports::IRemoteDrive;

use crate::hasher::HashCache;
use crate::probe::FolderProber;

/// Promotes new local files and folders to the remote store.
pub struct LocalPusher {
    drive: Arc<dyn IRemoteDrive>,
    catalog: Arc<Catalog>,
    drive_path: PathBuf,
    hashes: Arc<HashCache>,
}

impl LocalPusher {
    pub fn new(
        drive: Arc<dyn IRemoteDrive>,
        catalog: Arc<Catalog>,
        drive_path: PathBuf,
        hashes: Arc<HashCache>,
    ) -> Self {
        Self {
            drive,
            catalog,
            drive_path,
            hashes,
        }
    }

    /// Walks the local mirror and reconciles everything unknown to the
    /// catalog into the remote store.
    pub async fn push_local_changes(&self) -> Result<()> {
        let root = self
            .catalog
            .get_root()
            .await?
            .context("catalog has no root folder")?;

        let mut removed_folder_ids = self.catalog.locally_removed_folder_ids().await?;
        let prober = FolderProber::new(self.catalog.clone(), self.hashes.clone());

        let mut parents_stack: Vec<String> = vec![root.id.clone()];
        let walk_root = self.drive_path.join(&root.cur_remote_name);

        for dir_entry in WalkDir::new(&walk_root).sort_by_file_name() {
            let dir_entry = dir_entry.context("could not walk local drive tree")?;
            let path = dir_entry.path();
            let rel = path
                .strip_prefix(&self.drive_path)
                .context("walked outside the drive path")?;
            let depth = rel.components().count();
            let is_dir = dir_entry.file_type().is_dir();

            debug!(path = %path.display(), depth, "next local path");

            if depth <= 1 {
                // The mirrored root itself; it is always in the catalog.
                parents_stack.truncate(1);
                continue;
            }

            // The node's ancestors occupy depth-1 stack slots; the top is
            // its remote parent.
            parents_stack.truncate(depth - 1);
            let parent_id = parents_stack
                .last()
                .cloned()
                .context("parent stack is empty")?;

            let rel_str = rel.to_string_lossy();
            let existing = self
                .catalog
                .resolve_id_by_current_path(&rel_str, &root)
                .await?;
            let name = dir_entry.file_name().to_string_lossy().into_owned();

            let file_id = match existing {
                Some(id) => id,
                None if is_dir => {
                    self.promote_new_folder(
                        path,
                        rel,
                        &name,
                        &parent_id,
                        &root,
                        &prober,
                        &mut removed_folder_ids,
                    )
                    .await?
                }
                None => {
                    self.promote_new_file(path, &name, &parent_id).await?;
                    continue;
                }
            };

            if is_dir {
                parents_stack.push(file_id);
            }
        }

        Ok(())
    }

    /// Handles a local folder the catalog does not know: either a move of
    /// a locally removed folder (reclaimed via the equality prober) or a
    /// genuinely new folder to create remotely.
    #[allow(clippy::too_many_arguments)]
    async fn promote_new_folder(
        &self,
        path: &Path,
        rel: &Path,
        name: &str,
        parent_id: &str,
        root: &Entry,
        prober: &FolderProber,
        removed_folder_ids: &mut Vec<String>,
    ) -> Result<String> {
        // First guess: the folder was moved here from somewhere else, so
        // look for it among the locally removed folders.
        let mut matched: Option<String> = None;
        for candidate in removed_folder_ids.iter() {
            let same = prober
                .are_folders_the_same(path, candidate)
                .await
                .with_context(|| {
                    format!(
                        "could not compare folder {} against candidate {}",
                        path.display(),
                        candidate
                    )
                })?;
            if same {
                matched = Some(candidate.clone());
                break;
            }
        }

        if let Some(moved_id) = matched {
            let old_parent = self
                .catalog
                .parent_of(&moved_id)
                .await?
                .with_context(|| format!("no parent link for moved folder {moved_id}"))?;
            let rel_parent = rel
                .parent()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default();
            let new_parent = self
                .catalog
                .resolve_id_by_current_path(&rel_parent, root)
                .await?
                .with_context(|| format!("could not resolve parent of {}", rel.display()))?;

            info!(
                folder = %path.display(),
                id = %moved_id,
                from = %old_parent,
                to = %new_parent,
                "local move detected"
            );

            let meta = self
                .drive
                .rename_move(&moved_id, name, &[new_parent], &[old_parent])
                .await
                .context("could not re-parent folder remotely")?;

            self.catalog.set_removed_locally(&moved_id, false).await?;
            // The contents moved with the folder; nothing under it may be
            // deleted remotely by the deferred-deletion pass.
            self.catalog
                .clear_removed_locally_subtree(&moved_id)
                .await?;
            if let Some(mtime) = meta.modified_time {
                self.catalog
                    .set_cur_remote(&moved_id, mtime, &meta.name, &meta.parents)
                    .await?;
            }
            self.catalog.promote_prev_to_cur(&moved_id).await?;

            removed_folder_ids.retain(|id| id != &moved_id);
            return Ok(moved_id);
        }

        info!(path = %path.display(), parent_id = %parent_id, "creating folder remotely");
        let meta = self
            .drive
            .create_folder(name, &[parent_id.to_string()])
            .await
            .with_context(|| format!("could not create folder {}", path.display()))?;
        self.catalog
            .insert(&meta)
            .await
            .with_context(|| format!("could not save new folder {}", meta.id))?;
        Ok(meta.id)
    }

    /// Uploads a new local file, or issues a server-side copy when the
    /// store already holds byte-identical content of the same size.
    async fn promote_new_file(&self, path: &Path, name: &str, parent_id: &str) -> Result<()> {
        let local_meta = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("could not stat {}", path.display()))?;
        let hash = self.hashes.md5_of(path).await?;

        let dedup_source = match self.catalog.get_by_hash(&hash).await? {
            Some(existing) if existing.size_bytes == local_meta.len() => Some(existing),
            _ => None,
        };

        let meta = match dedup_source {
            Some(existing) => {
                info!(
                    path = %path.display(),
                    source = %existing.id,
                    "identical content already remote, issuing server-side copy"
                );
                self.drive
                    .copy_file(&existing.id, name, &[parent_id.to_string()])
                    .await
                    .with_context(|| format!("could not copy file to {}", path.display()))?
            }
            None => {
                info!(path = %path.display(), parent_id = %parent_id, "uploading new file");
                let data = tokio::fs::read(path)
                    .await
                    .with_context(|| format!("could not read {} for upload", path.display()))?;
                self.drive
                    .upload_new(name, &[parent_id.to_string()], data)
                    .await
                    .with_context(|| format!("could not upload {}", path.display()))?
            }
        };

        self.catalog
            .insert(&meta)
            .await
            .with_context(|| format!("could not save new file {}", meta.id))?;

        let mtime: DateTime<Utc> = local_meta
            .modified()
            .with_context(|| format!("no mtime available for {}", path.display()))?
            .into();
        self.catalog.set_download_time(&meta.id, mtime).await?;
        Ok(())
    }

    /// Deletes remotely every entry still flagged as removed locally after
    /// move detection had its chance. Only top-most flagged entries are
    /// deleted; their contents go with them, so the traversal does not
    /// descend into a flagged entry.
    pub async fn delete_locally_removed(&self) -> Result<()> {
        let Some(root) = self.catalog.get_root().await? else {
            return Ok(());
        };
        self.delete_removed_children(&root.id).await
    }

    fn delete_removed_children<'a>(
        &'a self,
        parent_id: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            for child in self.catalog.children_of(parent_id).await? {
                if child.removed_locally {
                    info!(
                        id = %child.id,
                        name = %child.cur_remote_name,
                        "deleting remotely (removed locally)"
                    );
                    self.drive
                        .delete(&child.id)
                        .await
                        .with_context(|| format!("could not delete {} remotely", child.id))?;
                } else {
                    self.delete_removed_children(&child.id).await?;
                }
            }
            Ok(())
        })
    }
}
