//! drivemir Sync - the reconciliation engine
//!
//! Orchestrates one synchronization pass between a remote drive and the
//! local mirror, in four stages that all funnel through the catalog:
//!
//! 1. **Feed** ([`feed::CatalogFeed`]): pull the remote change feed (or the
//!    full listing on first run) into the catalog.
//! 2. **Reconcile** ([`reconcile::LocalReconciler`]): traverse the catalog
//!    parent-before-child, classify every entry's local and remote change
//!    independently, and apply the reconciling action.
//! 3. **Push** ([`push::LocalPusher`]): walk the local tree, promote new
//!    files and folders remotely, detecting moved folders first.
//! 4. **Cleanup**: drop catalog rows whose object is gone on either side.
//!
//! ## Concurrency
//!
//! The catalog has a single logical writer. Every traversal that feeds a
//! writer runs as a producer task handing items over a bounded channel,
//! with an explicit done-signal back after each item so the producer can
//! never race ahead of the applied state.

pub mod feed;
pub mod hasher;
pub mod probe;
pub mod push;
pub mod reconcile;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use drivemir_catalog::Catalog;
use drivemir_core::ports::IRemoteDrive;

use crate::feed::CatalogFeed;
use crate::hasher::HashCache;
use crate::push::LocalPusher;
use crate::reconcile::LocalReconciler;

/// One full synchronization pass over a drive mirror.
pub struct SyncEngine {
    drive: Arc<dyn IRemoteDrive>,
    catalog: Arc<Catalog>,
    /// Local mount point; the mirrored root folder lives directly under it.
    drive_path: PathBuf,
    page_size: i64,
    feed_timeout: Duration,
}

impl SyncEngine {
    pub fn new(
        drive: Arc<dyn IRemoteDrive>,
        catalog: Arc<Catalog>,
        drive_path: PathBuf,
        page_size: i64,
    ) -> Self {
        Self {
            drive,
            catalog,
            drive_path,
            page_size,
            feed_timeout: feed::DEFAULT_CONSUMER_TIMEOUT,
        }
    }

    /// Overrides the change-feed consumer inactivity timeout.
    pub fn with_feed_timeout(mut self, timeout: Duration) -> Self {
        self.feed_timeout = timeout;
        self
    }

    /// Runs the full pipeline once. Re-entrant: every stage is idempotent
    /// under restart, so an aborted pass is recovered by running again.
    pub async fn run(&self) -> Result<()> {
        let feed = CatalogFeed::new(self.drive.clone(), self.catalog.clone(), self.page_size)
            .with_consumer_timeout(self.feed_timeout);

        match self.catalog.get_root().await? {
            None => {
                info!("catalog is empty, performing initial population");
                feed.populate().await.context("initial catalog population failed")?;
            }
            Some(_) => {
                feed.pull_changes()
                    .await
                    .context("pulling remote changes failed")?;
            }
        }
        info!("metadata syncing finished");

        let hashes = Arc::new(HashCache::new());

        let reconciler = LocalReconciler::new(
            self.drive.clone(),
            self.catalog.clone(),
            self.drive_path.clone(),
        );
        reconciler
            .apply_remote_changes()
            .await
            .context("reconciling remote changes to local failed")?;

        let pusher = LocalPusher::new(
            self.drive.clone(),
            self.catalog.clone(),
            self.drive_path.clone(),
            hashes,
        );
        pusher
            .push_local_changes()
            .await
            .context("pushing local changes failed")?;
        pusher
            .delete_locally_removed()
            .await
            .context("deleting locally removed entries failed")?;

        self.catalog.cleanup().await.context("catalog cleanup failed")?;

        info!("synchronization pass completed");
        Ok(())
    }
}
