//! Shared test rig: engine + in-memory catalog + temp mirror + fake drive

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use drivemir_catalog::{Catalog, CatalogPool};
use drivemir_core::ports::IRemoteDrive;
use drivemir_sync::SyncEngine;

use crate::fake_drive::FakeDrive;

pub struct Rig {
    pub drive: Arc<FakeDrive>,
    pub catalog: Arc<Catalog>,
    pub engine: SyncEngine,
    pub drive_path: PathBuf,
    pub _tmp: tempfile::TempDir,
}

pub async fn rig() -> Rig {
    let pool = CatalogPool::in_memory().await.unwrap();
    let catalog = Arc::new(Catalog::new(pool.pool().clone()));
    let drive = Arc::new(FakeDrive::new());
    let tmp = tempfile::tempdir().unwrap();
    let drive_path = tmp.path().to_path_buf();

    let dyn_drive: Arc<dyn IRemoteDrive> = drive.clone();
    let engine = SyncEngine::new(dyn_drive, catalog.clone(), drive_path.clone(), 100);

    Rig {
        drive,
        catalog,
        engine,
        drive_path,
        _tmp: tmp,
    }
}

pub fn t(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

pub fn file_mtime(path: &std::path::Path) -> DateTime<Utc> {
    std::fs::metadata(path).unwrap().modified().unwrap().into()
}

/// Seed the canonical starting state: remote root with one 9-byte file.
pub fn seed_cold_start(drive: &FakeDrive) {
    drive.seed_root("My Drive");
    drive.add_file(
        "f-a",
        "a.txt",
        "root",
        b"123456789",
        t("2024-01-01T00:00:00Z"),
    );
}
