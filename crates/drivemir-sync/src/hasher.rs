//! Content hashing with a per-run cache
//!
//! The remote store identifies file content by MD5. Local hashes are
//! needed in several places per pass (upload probes, folder-equality
//! comparison, upload dedup), often for the same file, so results are
//! cached for the lifetime of the run. Folders have no hash.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dashmap::DashMap;
use md5::{Digest, Md5};
use tokio::io::AsyncReadExt;

/// Computes the MD5 of a file's content as lowercase hex.
pub async fn md5_of_file(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("could not open {} for hashing", path.display()))?;

    let mut hasher = Md5::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file
            .read(&mut buf)
            .await
            .with_context(|| format!("could not read {} for hashing", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Caching wrapper around [`md5_of_file`].
///
/// The cache key is the full path; entries live as long as the cache.
/// Within one pass local files the engine reads are not rewritten before
/// the hash is needed again, so there is no invalidation.
#[derive(Default)]
pub struct HashCache {
    cache: DashMap<PathBuf, String>,
}

impl HashCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the MD5 of the file, computing and caching it on first use.
    pub async fn md5_of(&self, path: &Path) -> Result<String> {
        if let Some(hash) = self.cache.get(path) {
            return Ok(hash.clone());
        }
        let hash = md5_of_file(path).await?;
        self.cache.insert(path.to_owned(), hash.clone());
        Ok(hash)
    }
}
