//! Remote change feed → catalog
//!
//! Two entry points: [`CatalogFeed::populate`] pages the full remote
//! listing into an empty catalog, [`CatalogFeed::pull_changes`] applies
//! the incremental change feed from the persisted resume cursor.
//!
//! A producer task pages the remote API and hands descriptors over a
//! bounded channel; the consumer applies catalog writes serially. Any
//! transport or decode error aborts the pass with the catalog in whatever
//! partial state the applied updates left it — safe, because every write
//! is idempotent under the "id-keyed, cur fields only" rule and a restart
//! reclassifies from the `prev_*` snapshot.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use drivemir_catalog::{Catalog, NEXT_CHANGE_TOKEN};
use drivemir_core::ports::{IRemoteDrive, RemoteChangeRecord, RemoteFileMeta};

/// How long the consumer waits for the next feed message before declaring
/// the pass stalled.
pub const DEFAULT_CONSUMER_TIMEOUT: Duration = Duration::from_secs(10);

/// Populates and updates the catalog from the remote store.
pub struct CatalogFeed {
    drive: Arc<dyn IRemoteDrive>,
    catalog: Arc<Catalog>,
    page_size: i64,
    consumer_timeout: Duration,
}

impl CatalogFeed {
    pub fn new(drive: Arc<dyn IRemoteDrive>, catalog: Arc<Catalog>, page_size: i64) -> Self {
        Self {
            drive,
            catalog,
            page_size,
            consumer_timeout: DEFAULT_CONSUMER_TIMEOUT,
        }
    }

    /// Overrides the consumer inactivity timeout.
    pub fn with_consumer_timeout(mut self, timeout: Duration) -> Self {
        self.consumer_timeout = timeout;
        self
    }

    /// Initial population: fetch the root descriptor, insert it, then page
    /// the full listing into the catalog.
    pub async fn populate(&self) -> Result<()> {
        let root = self
            .drive
            .get_root()
            .await
            .context("could not fetch root folder descriptor")?;
        debug!(id = %root.id, name = %root.name, "found root folder");

        self.catalog
            .insert_root(&root)
            .await
            .context("could not save root folder")?;

        let (tx, mut rx) = mpsc::channel::<RemoteFileMeta>(1);
        let drive = self.drive.clone();
        let page_size = self.page_size;

        let producer = tokio::spawn(async move {
            let mut token: Option<String> = None;
            loop {
                let page = drive
                    .list_files(token.as_deref(), page_size)
                    .await
                    .context("could not retrieve file listing page")?;
                info!(files = page.files.len(), "listing files");
                for meta in page.files {
                    if tx.send(meta).await.is_err() {
                        return Ok(()); // consumer gone; it carries the error
                    }
                }
                match page.next_page_token {
                    Some(next) => token = Some(next),
                    None => break,
                }
            }
            Ok::<(), anyhow::Error>(())
        });

        while let Some(meta) = self.next_message(&mut rx).await? {
            self.apply_descriptor(&meta).await?;
        }

        producer.await.context("listing producer panicked")??;
        Ok(())
    }

    /// Incremental population from the change feed.
    ///
    /// The start token is captured at the beginning of the pass and
    /// persisted after the loop, not the per-page next token: a failed
    /// pass restarts from where it began instead of skipping changes.
    /// At-least-once reprocessing is harmless; every write is idempotent.
    pub async fn pull_changes(&self) -> Result<()> {
        let start_token = self
            .drive
            .get_start_page_token()
            .await
            .context("could not fetch start page token")?;

        let resume_token = match self.catalog.state_get(NEXT_CHANGE_TOKEN).await? {
            Some(token) => token,
            None => {
                info!(token = %start_token, "no resume cursor, starting fresh");
                start_token.clone()
            }
        };

        let (tx, mut rx) = mpsc::channel::<RemoteChangeRecord>(1);
        let drive = self.drive.clone();
        let page_size = self.page_size;

        let producer = tokio::spawn(async move {
            let mut token = resume_token;
            loop {
                let page = drive
                    .list_changes(&token, page_size)
                    .await
                    .context("could not retrieve change feed page")?;
                debug!(changes = page.changes.len(), "got change page");
                for change in page.changes {
                    if tx.send(change).await.is_err() {
                        return Ok(());
                    }
                }
                match page.next_page_token {
                    Some(next) => token = next,
                    None => break,
                }
            }
            Ok::<(), anyhow::Error>(())
        });

        while let Some(change) = self.next_message(&mut rx).await? {
            if change.is_removal() {
                debug!(id = %change.file_id, "change: removed or trashed");
                self.catalog
                    .set_removed_remotely(&change.file_id)
                    .await
                    .context("could not flag entry as removed remotely")?;
            } else if let Some(ref meta) = change.file {
                self.apply_descriptor(meta).await?;
            } else {
                warn!(id = %change.file_id, "change without descriptor or removal flag, skipping");
            }
        }

        producer.await.context("change producer panicked")??;

        self.catalog
            .state_set(NEXT_CHANGE_TOKEN, &start_token)
            .await
            .context("could not persist change feed cursor")?;

        Ok(())
    }

    /// Receives the next feed message, aborting the pass when the
    /// producer goes quiet for longer than the consumer timeout.
    async fn next_message<T>(&self, rx: &mut mpsc::Receiver<T>) -> Result<Option<T>> {
        tokio::time::timeout(self.consumer_timeout, rx.recv())
            .await
            .map_err(|_| {
                anyhow!(
                    "remote feed stalled: no message within {:?}",
                    self.consumer_timeout
                )
            })
    }

    /// Applies one descriptor: update the current snapshot of a known
    /// entry, or insert a new one with both snapshots equal.
    async fn apply_descriptor(&self, meta: &RemoteFileMeta) -> Result<()> {
        if self.catalog.get_by_id(&meta.id).await?.is_some() {
            if let Some(mtime) = meta.modified_time {
                self.catalog
                    .set_cur_remote(&meta.id, mtime, &meta.name, &meta.parents)
                    .await
                    .with_context(|| format!("could not update entry {}", meta.id))?;
            }
        } else {
            debug!(id = %meta.id, name = %meta.name, "creating entry in catalog");
            self.catalog
                .insert(meta)
                .await
                .with_context(|| format!("could not insert entry {}", meta.id))?;
        }
        Ok(())
    }
}
