//! Folder-equality prober
//!
//! Decides whether a local directory tree and a catalog subtree are the
//! same: matching pre-order traversals where every pair agrees on name
//! and folder-flag, and every file pair agrees on MD5. Used by move
//! detection to tell a genuinely new local folder from a locally moved
//! one.
//!
//! Both sides run as producers feeding bounded channels; the comparator
//! consumes them pair-wise in lockstep so neither side races ahead. If
//! exactly one side runs out first the trees differ in shape and are
//! unequal.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::debug;
use walkdir::WalkDir;

use drivemir_catalog::Catalog;
use drivemir_core::domain::Entry;

use crate::hasher::HashCache;

/// One node from the local walk.
struct LocalNode {
    name: String,
    is_dir: bool,
    path: PathBuf,
}

/// Compares catalog subtrees against local directory trees.
pub struct FolderProber {
    catalog: Arc<Catalog>,
    hashes: Arc<HashCache>,
}

impl FolderProber {
    pub fn new(catalog: Arc<Catalog>, hashes: Arc<HashCache>) -> Self {
        Self { catalog, hashes }
    }

    /// Returns true when the local tree rooted at `local_folder` matches
    /// the catalog subtree under `folder_id`, node for node.
    pub async fn are_folders_the_same(
        &self,
        local_folder: &Path,
        folder_id: &str,
    ) -> Result<bool> {
        // Catalog side: pre-order by current name, rendezvous-paced.
        let (db_tx, mut db_rx) = mpsc::channel::<Entry>(1);
        let (db_done_tx, mut db_done_rx) = mpsc::channel::<()>(1);
        let catalog = self.catalog.clone();
        let subtree_root = folder_id.to_string();
        let db_task = tokio::spawn(async move {
            send_subtree(&catalog, &subtree_root, &db_tx, &mut db_done_rx).await
        });

        // Local side: sorted pre-order walk, skipping the folder itself.
        let (loc_tx, mut loc_rx) = mpsc::channel::<LocalNode>(1);
        let walk_root = local_folder.to_owned();
        let loc_task = tokio::task::spawn_blocking(move || -> Result<()> {
            for dir_entry in WalkDir::new(&walk_root).sort_by_file_name() {
                let dir_entry = dir_entry.context("could not walk local folder")?;
                if dir_entry.path() == walk_root {
                    continue;
                }
                let node = LocalNode {
                    name: dir_entry.file_name().to_string_lossy().into_owned(),
                    is_dir: dir_entry.file_type().is_dir(),
                    path: dir_entry.path().to_owned(),
                };
                if loc_tx.blocking_send(node).is_err() {
                    break;
                }
            }
            Ok(())
        });

        let mut same = true;
        loop {
            let db_item = db_rx.recv().await;
            if db_item.is_some() {
                db_done_tx.send(()).await.ok();
            }
            let loc_item = loc_rx.recv().await;

            match (db_item, loc_item) {
                (None, None) => break,
                // One stream ended early: the trees differ in shape.
                (Some(_), None) | (None, Some(_)) => {
                    same = false;
                    break;
                }
                (Some(db), Some(loc)) => {
                    if db.cur_remote_name != loc.name {
                        same = false;
                        break;
                    }
                    if db.is_folder() != loc.is_dir {
                        same = false;
                        break;
                    }
                    if db.is_folder() {
                        continue;
                    }
                    let hash = self.hashes.md5_of(&loc.path).await?;
                    if hash != db.hash {
                        same = false;
                        break;
                    }
                }
            }
        }

        // Dropping the channels unwinds both producers.
        drop(db_done_tx);
        drop(db_rx);
        drop(loc_rx);
        let _ = db_task.await;
        let _ = loc_task.await;

        debug!(
            folder = %local_folder.display(),
            id = %folder_id,
            same,
            "compared folder trees"
        );
        Ok(same)
    }
}

/// Emits the catalog subtree under `parent_id` in pre-order, children by
/// current name, waiting for a done-signal after each node.
fn send_subtree<'a>(
    catalog: &'a Catalog,
    parent_id: &'a str,
    tx: &'a mpsc::Sender<Entry>,
    done_rx: &'a mut mpsc::Receiver<()>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let children = catalog
            .children_of(parent_id)
            .await
            .with_context(|| format!("could not get children of {parent_id}"))?;

        for child in children {
            let child_id = child.id.clone();
            if tx.send(child).await.is_err() {
                return Ok(());
            }
            if done_rx.recv().await.is_none() {
                return Ok(());
            }
            send_subtree(catalog, &child_id, tx, done_rx).await?;
        }
        Ok(())
    })
}
