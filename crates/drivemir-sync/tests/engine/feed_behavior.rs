//! Change feed behavior: cursor persistence, removal flagging, stalls

use std::sync::Arc;
use std::time::Duration;

use drivemir_catalog::{Catalog, CatalogPool, NEXT_CHANGE_TOKEN};
use drivemir_core::ports::{
    ByteStream, ChangePage, FilePage, IRemoteDrive, RemoteFileMeta,
};
use drivemir_sync::feed::CatalogFeed;

use crate::fake_drive::FakeDrive;

async fn catalog() -> Arc<Catalog> {
    let pool = CatalogPool::in_memory().await.unwrap();
    Arc::new(Catalog::new(pool.pool().clone()))
}

fn t0() -> chrono::DateTime<chrono::Utc> {
    "2024-01-01T00:00:00Z".parse().unwrap()
}

#[tokio::test]
async fn populate_inserts_root_and_descriptors() {
    let catalog = catalog().await;
    let drive = Arc::new(FakeDrive::new());
    drive.seed_root("My Drive");
    drive.add_file("f-a", "a.txt", "root", b"bytes", t0());
    drive.add_folder("f-sub", "sub", "root", t0());

    let dyn_drive: Arc<dyn IRemoteDrive> = drive.clone();
    CatalogFeed::new(dyn_drive, catalog.clone(), 100)
        .populate()
        .await
        .unwrap();

    assert!(catalog.get_root().await.unwrap().is_some());
    assert!(catalog.get_by_id("f-a").await.unwrap().is_some());
    assert!(catalog.get_by_id("f-sub").await.unwrap().is_some());
}

#[tokio::test]
async fn pull_changes_persists_the_pass_start_token() {
    let catalog = catalog().await;
    let drive = Arc::new(FakeDrive::new());
    drive.seed_root("My Drive");

    let dyn_drive: Arc<dyn IRemoteDrive> = drive.clone();
    let feed = CatalogFeed::new(dyn_drive, catalog.clone(), 100);
    feed.populate().await.unwrap();
    feed.pull_changes().await.unwrap();

    // The cursor persisted after the loop is the token captured at the
    // start of the pass, so a failed pass restarts from where it began.
    assert_eq!(
        catalog.state_get(NEXT_CHANGE_TOKEN).await.unwrap().as_deref(),
        Some("start-token")
    );
}

#[tokio::test]
async fn pull_changes_flags_removed_and_trashed_entries() {
    let catalog = catalog().await;
    let drive = Arc::new(FakeDrive::new());
    drive.seed_root("My Drive");
    drive.add_file("f-a", "a.txt", "root", b"bytes", t0());

    let dyn_drive: Arc<dyn IRemoteDrive> = drive.clone();
    let feed = CatalogFeed::new(dyn_drive, catalog.clone(), 100);
    feed.populate().await.unwrap();

    drive.remote_remove("f-a");
    feed.pull_changes().await.unwrap();

    let entry = catalog.get_by_id("f-a").await.unwrap().unwrap();
    assert!(entry.removed_remotely);
}

#[tokio::test]
async fn pull_changes_updates_only_the_current_snapshot() {
    let catalog = catalog().await;
    let drive = Arc::new(FakeDrive::new());
    drive.seed_root("My Drive");
    drive.add_file("f-a", "a.txt", "root", b"bytes", t0());

    let dyn_drive: Arc<dyn IRemoteDrive> = drive.clone();
    let feed = CatalogFeed::new(dyn_drive, catalog.clone(), 100);
    feed.populate().await.unwrap();

    drive.remote_rename("f-a", "b.txt", "2024-02-01T00:00:00Z".parse().unwrap());
    feed.pull_changes().await.unwrap();

    let entry = catalog.get_by_id("f-a").await.unwrap().unwrap();
    assert_eq!(entry.cur_remote_name, "b.txt");
    assert_eq!(entry.prev_remote_name, "a.txt");
}

/// A drive whose change feed never produces a page; with `stall_listing`
/// the full listing hangs as well.
struct StallingDrive {
    inner: FakeDrive,
    stall_listing: bool,
}

#[async_trait::async_trait]
impl IRemoteDrive for StallingDrive {
    async fn get_start_page_token(&self) -> anyhow::Result<String> {
        self.inner.get_start_page_token().await
    }

    async fn list_changes(&self, _page_token: &str, _page_size: i64) -> anyhow::Result<ChangePage> {
        std::future::pending::<()>().await;
        unreachable!()
    }

    async fn list_files(
        &self,
        page_token: Option<&str>,
        page_size: i64,
    ) -> anyhow::Result<FilePage> {
        if self.stall_listing {
            std::future::pending::<()>().await;
            unreachable!()
        }
        self.inner.list_files(page_token, page_size).await
    }

    async fn get_root(&self) -> anyhow::Result<RemoteFileMeta> {
        self.inner.get_root().await
    }

    async fn get_by_id(&self, id: &str) -> anyhow::Result<RemoteFileMeta> {
        self.inner.get_by_id(id).await
    }

    async fn download(&self, id: &str) -> anyhow::Result<ByteStream> {
        self.inner.download(id).await
    }

    async fn create_folder(
        &self,
        name: &str,
        parent_ids: &[String],
    ) -> anyhow::Result<RemoteFileMeta> {
        self.inner.create_folder(name, parent_ids).await
    }

    async fn upload_new(
        &self,
        name: &str,
        parent_ids: &[String],
        data: Vec<u8>,
    ) -> anyhow::Result<RemoteFileMeta> {
        self.inner.upload_new(name, parent_ids, data).await
    }

    async fn update_media(&self, id: &str, data: Vec<u8>) -> anyhow::Result<RemoteFileMeta> {
        self.inner.update_media(id, data).await
    }

    async fn rename_move(
        &self,
        id: &str,
        name: &str,
        add_parents: &[String],
        remove_parents: &[String],
    ) -> anyhow::Result<RemoteFileMeta> {
        self.inner.rename_move(id, name, add_parents, remove_parents).await
    }

    async fn copy_file(
        &self,
        source_id: &str,
        name: &str,
        parent_ids: &[String],
    ) -> anyhow::Result<RemoteFileMeta> {
        self.inner.copy_file(source_id, name, parent_ids).await
    }

    async fn delete(&self, id: &str) -> anyhow::Result<()> {
        self.inner.delete(id).await
    }
}

#[tokio::test]
async fn a_stalled_change_feed_aborts_the_pass() {
    let catalog = catalog().await;
    let inner = FakeDrive::new();
    inner.seed_root("My Drive");
    let drive: Arc<dyn IRemoteDrive> = Arc::new(StallingDrive {
        inner,
        stall_listing: false,
    });

    let feed = CatalogFeed::new(drive, catalog.clone(), 100)
        .with_consumer_timeout(Duration::from_millis(50));

    let err = feed.pull_changes().await.unwrap_err();
    assert!(format!("{err:#}").contains("stalled"));
}

#[tokio::test]
async fn a_stalled_listing_aborts_initial_population() {
    let catalog = catalog().await;
    let inner = FakeDrive::new();
    inner.seed_root("My Drive");
    let drive: Arc<dyn IRemoteDrive> = Arc::new(StallingDrive {
        inner,
        stall_listing: true,
    });

    let feed = CatalogFeed::new(drive, catalog.clone(), 100)
        .with_consumer_timeout(Duration::from_millis(50));

    let err = feed.populate().await.unwrap_err();
    assert!(format!("{err:#}").contains("stalled"));
}
