//! Folder-equality prober tests
//!
//! Seed a catalog subtree and a local directory, then ask the prober
//! whether they are the same tree.

use std::path::Path;
use std::sync::Arc;

use drivemir_catalog::{Catalog, CatalogPool};
use drivemir_core::domain::FOLDER_MIME_TYPE;
use drivemir_core::ports::RemoteFileMeta;
use drivemir_sync::hasher::HashCache;
use drivemir_sync::probe::FolderProber;

use crate::fake_drive::md5_hex;

async fn catalog() -> Arc<Catalog> {
    let pool = CatalogPool::in_memory().await.unwrap();
    Arc::new(Catalog::new(pool.pool().clone()))
}

fn folder(id: &str, name: &str, parent: &str) -> RemoteFileMeta {
    RemoteFileMeta {
        id: id.into(),
        name: name.into(),
        mime_type: FOLDER_MIME_TYPE.into(),
        parents: vec![parent.into()],
        md5_checksum: None,
        size: 0,
        modified_time: Some("2024-01-01T00:00:00Z".parse().unwrap()),
        shared: false,
        trashed: false,
        explicitly_trashed: false,
    }
}

fn file(id: &str, name: &str, parent: &str, content: &[u8]) -> RemoteFileMeta {
    RemoteFileMeta {
        id: id.into(),
        name: name.into(),
        mime_type: "text/plain".into(),
        parents: vec![parent.into()],
        md5_checksum: Some(md5_hex(content)),
        size: content.len() as u64,
        modified_time: Some("2024-01-01T00:00:00Z".parse().unwrap()),
        shared: false,
        trashed: false,
        explicitly_trashed: false,
    }
}

/// Catalog subtree: dir/{inner/{y.txt}, x.txt}
async fn seed_subtree(catalog: &Catalog) {
    let mut root = folder("root", "My Drive", "");
    root.parents.clear();
    catalog.insert_root(&root).await.unwrap();
    catalog.insert(&folder("f-dir", "dir", "root")).await.unwrap();
    catalog
        .insert(&folder("f-inner", "inner", "f-dir"))
        .await
        .unwrap();
    catalog
        .insert(&file("f-y", "y.txt", "f-inner", b"nested bytes"))
        .await
        .unwrap();
    catalog
        .insert(&file("f-x", "x.txt", "f-dir", b"top bytes"))
        .await
        .unwrap();
}

/// Matching local tree under `base`
fn build_local(base: &Path) {
    std::fs::create_dir(base).unwrap();
    std::fs::create_dir(base.join("inner")).unwrap();
    std::fs::write(base.join("inner").join("y.txt"), b"nested bytes").unwrap();
    std::fs::write(base.join("x.txt"), b"top bytes").unwrap();
}

async fn prober(catalog: &Arc<Catalog>) -> FolderProber {
    FolderProber::new(catalog.clone(), Arc::new(HashCache::new()))
}

#[tokio::test]
async fn identical_trees_match() {
    let catalog = catalog().await;
    seed_subtree(&catalog).await;
    let tmp = tempfile::tempdir().unwrap();
    let local = tmp.path().join("dir");
    build_local(&local);

    assert!(prober(&catalog)
        .await
        .are_folders_the_same(&local, "f-dir")
        .await
        .unwrap());
}

#[tokio::test]
async fn divergent_file_content_does_not_match() {
    let catalog = catalog().await;
    seed_subtree(&catalog).await;
    let tmp = tempfile::tempdir().unwrap();
    let local = tmp.path().join("dir");
    build_local(&local);
    std::fs::write(local.join("x.txt"), b"other bytes").unwrap();

    assert!(!prober(&catalog)
        .await
        .are_folders_the_same(&local, "f-dir")
        .await
        .unwrap());
}

#[tokio::test]
async fn an_extra_local_file_does_not_match() {
    let catalog = catalog().await;
    seed_subtree(&catalog).await;
    let tmp = tempfile::tempdir().unwrap();
    let local = tmp.path().join("dir");
    build_local(&local);
    std::fs::write(local.join("z.txt"), b"straggler").unwrap();

    assert!(!prober(&catalog)
        .await
        .are_folders_the_same(&local, "f-dir")
        .await
        .unwrap());
}

#[tokio::test]
async fn a_missing_local_file_does_not_match() {
    let catalog = catalog().await;
    seed_subtree(&catalog).await;
    let tmp = tempfile::tempdir().unwrap();
    let local = tmp.path().join("dir");
    build_local(&local);
    std::fs::remove_file(local.join("inner").join("y.txt")).unwrap();

    assert!(!prober(&catalog)
        .await
        .are_folders_the_same(&local, "f-dir")
        .await
        .unwrap());
}

#[tokio::test]
async fn a_renamed_node_does_not_match() {
    let catalog = catalog().await;
    seed_subtree(&catalog).await;
    let tmp = tempfile::tempdir().unwrap();
    let local = tmp.path().join("dir");
    build_local(&local);
    std::fs::rename(local.join("x.txt"), local.join("w.txt")).unwrap();

    assert!(!prober(&catalog)
        .await
        .are_folders_the_same(&local, "f-dir")
        .await
        .unwrap());
}

#[tokio::test]
async fn folder_flag_mismatch_does_not_match() {
    let catalog = catalog().await;
    seed_subtree(&catalog).await;
    let tmp = tempfile::tempdir().unwrap();
    let local = tmp.path().join("dir");
    // "inner" exists locally as a plain file
    std::fs::create_dir(&local).unwrap();
    std::fs::write(local.join("inner"), b"not a folder").unwrap();
    std::fs::write(local.join("x.txt"), b"top bytes").unwrap();

    assert!(!prober(&catalog)
        .await
        .are_folders_the_same(&local, "f-dir")
        .await
        .unwrap());
}

#[tokio::test]
async fn empty_against_empty_matches() {
    let catalog = catalog().await;
    let mut root = folder("root", "My Drive", "");
    root.parents.clear();
    catalog.insert_root(&root).await.unwrap();
    catalog
        .insert(&folder("f-empty", "empty", "root"))
        .await
        .unwrap();

    let tmp = tempfile::tempdir().unwrap();
    let local = tmp.path().join("empty");
    std::fs::create_dir(&local).unwrap();

    assert!(prober(&catalog)
        .await
        .are_folders_the_same(&local, "f-empty")
        .await
        .unwrap());
}
