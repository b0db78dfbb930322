//! Catalog operations over entries, parent links and app state
//!
//! All writes that touch both an entry and its parent link run inside a
//! single transaction, so a crash never leaves the two relations
//! disagreeing about an object.
//!
//! ## Type Mapping
//!
//! | Domain type        | SQL type | Strategy                                  |
//! |--------------------|----------|-------------------------------------------|
//! | `String` ids/names | TEXT     | stored verbatim (remote ids are opaque)   |
//! | `DateTime<Utc>`    | TEXT     | RFC 3339 with nanoseconds; NULL = unset   |
//! | flags              | INTEGER  | 0/1                                       |

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use drivemir_core::domain::Entry;
use drivemir_core::ports::RemoteFileMeta;

use crate::CatalogError;

/// All the columns of the `entries` table, in the order the row mapper
/// expects them. Shared between the queries that return whole entries.
const ENTRY_COLUMNS: &str = "\
    entries.id, \
    entries.prev_remote_name, \
    entries.cur_remote_name, \
    entries.hash, \
    entries.download_time, \
    entries.prev_remote_modification_time, \
    entries.cur_remote_modification_time, \
    entries.mime_type, \
    entries.shared, \
    entries.root_folder, \
    entries.trashed, \
    entries.removed_remotely, \
    entries.removed_locally, \
    entries.size_bytes";

/// SQLite-backed catalog of known remote objects.
pub struct Catalog {
    pool: SqlitePool,
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

/// Serialize an instant for storage: RFC 3339 with nanosecond precision.
fn format_datetime(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Parse a stored RFC 3339 instant.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CatalogError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            CatalogError::Serialization(format!("failed to parse datetime '{}': {}", s, e))
        })
}

fn parse_optional_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, CatalogError> {
    match s {
        Some(ref val) if !val.is_empty() => parse_datetime(val).map(Some),
        _ => Ok(None),
    }
}

/// Reconstruct an [`Entry`] from a database row.
fn entry_from_row(row: &SqliteRow) -> Result<Entry, CatalogError> {
    let download_time: Option<String> = row.get("download_time");
    let prev_mtime: Option<String> = row.get("prev_remote_modification_time");
    let cur_mtime: Option<String> = row.get("cur_remote_modification_time");
    let size_bytes: i64 = row.get("size_bytes");

    Ok(Entry {
        id: row.get("id"),
        prev_remote_name: row.get("prev_remote_name"),
        cur_remote_name: row.get("cur_remote_name"),
        hash: row.get("hash"),
        download_time: parse_optional_datetime(download_time)?,
        prev_remote_mtime: parse_optional_datetime(prev_mtime)?,
        cur_remote_mtime: parse_optional_datetime(cur_mtime)?,
        mime_type: row.get("mime_type"),
        shared: row.get::<i64, _>("shared") != 0,
        root_folder: row.get::<i64, _>("root_folder") != 0,
        trashed: row.get::<i64, _>("trashed") != 0,
        removed_remotely: row.get::<i64, _>("removed_remotely") != 0,
        removed_locally: row.get::<i64, _>("removed_locally") != 0,
        size_bytes: size_bytes as u64,
    })
}

// ============================================================================
// Entry operations
// ============================================================================

impl Catalog {
    /// Creates a catalog over the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Returns the unique root entry, if the catalog has been populated.
    pub async fn get_root(&self) -> Result<Option<Entry>, CatalogError> {
        let row = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM entries WHERE root_folder = 1 LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(entry_from_row(r)?)),
            None => Ok(None),
        }
    }

    /// Fetches an entry by its remote id.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Entry>, CatalogError> {
        let row = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM entries WHERE id = ? LIMIT 1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(entry_from_row(r)?)),
            None => Ok(None),
        }
    }

    /// Fetches an entry whose content hash matches.
    ///
    /// Used for upload deduplication: byte-identical content can be
    /// realized remotely with a server-side copy instead of a re-upload.
    /// The empty hash (folders, hashless formats) never matches.
    pub async fn get_by_hash(&self, hash: &str) -> Result<Option<Entry>, CatalogError> {
        if hash.is_empty() {
            return Ok(None);
        }

        let row = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM entries WHERE hash = ? LIMIT 1"
        ))
        .bind(hash)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(entry_from_row(r)?)),
            None => Ok(None),
        }
    }

    /// Inserts the root folder descriptor. No parent link is created.
    pub async fn insert_root(&self, meta: &RemoteFileMeta) -> Result<(), CatalogError> {
        let mtime = meta.modified_time.as_ref().map(format_datetime);

        sqlx::query(
            "INSERT INTO entries \
             (id, prev_remote_name, cur_remote_name, hash, \
              prev_remote_modification_time, cur_remote_modification_time, \
              mime_type, shared, root_folder, trashed, removed_remotely, size_bytes) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, 0, 0, ?)",
        )
        .bind(&meta.id)
        .bind(&meta.name)
        .bind(&meta.name)
        .bind(meta.md5_checksum.as_deref().unwrap_or(""))
        .bind(&mtime)
        .bind(&mtime)
        .bind(&meta.mime_type)
        .bind(meta.shared as i64)
        .bind(meta.size as i64)
        .execute(&self.pool)
        .await?;

        tracing::debug!(id = %meta.id, name = %meta.name, "inserted root folder");
        Ok(())
    }

    /// Inserts a newly observed remote object together with its parent link.
    ///
    /// Both snapshots start out equal: a fresh entry is by definition
    /// unchanged since its (nonexistent) last apply.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::MultipleParents` if the descriptor carries
    /// more than one parent; nothing is written in that case.
    pub async fn insert(&self, meta: &RemoteFileMeta) -> Result<(), CatalogError> {
        if meta.parents.len() > 1 {
            return Err(CatalogError::MultipleParents(meta.id.clone()));
        }

        let mtime = meta.modified_time.as_ref().map(format_datetime);
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO entries \
             (id, prev_remote_name, cur_remote_name, hash, \
              prev_remote_modification_time, cur_remote_modification_time, \
              mime_type, shared, root_folder, trashed, removed_remotely, size_bytes) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?, 0, ?)",
        )
        .bind(&meta.id)
        .bind(&meta.name)
        .bind(&meta.name)
        .bind(meta.md5_checksum.as_deref().unwrap_or(""))
        .bind(&mtime)
        .bind(&mtime)
        .bind(&meta.mime_type)
        .bind(meta.shared as i64)
        .bind(meta.trashed as i64)
        .bind(meta.size as i64)
        .execute(&mut *tx)
        .await?;

        if let Some(parent_id) = meta.parents.first() {
            sqlx::query(
                "INSERT INTO parent_links (file_id, prev_parent_id, cur_parent_id) \
                 VALUES (?, ?, ?)",
            )
            .bind(&meta.id)
            .bind(parent_id)
            .bind(parent_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::trace!(id = %meta.id, name = %meta.name, "inserted entry");
        Ok(())
    }

    /// Records the currently-known remote state of an entry: mtime, name
    /// and current parent. The `prev_*` snapshot is left untouched so the
    /// next classification can see the divergence.
    ///
    /// No-op when `parents` is empty; more than one parent is rejected.
    pub async fn set_cur_remote(
        &self,
        id: &str,
        mtime: DateTime<Utc>,
        name: &str,
        parents: &[String],
    ) -> Result<(), CatalogError> {
        if parents.len() > 1 {
            return Err(CatalogError::MultipleParents(id.to_string()));
        }
        let Some(parent_id) = parents.first() else {
            return Ok(());
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE entries SET cur_remote_modification_time = ?, cur_remote_name = ? \
             WHERE id = ?",
        )
        .bind(format_datetime(&mtime))
        .bind(name)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE parent_links SET cur_parent_id = ? WHERE file_id = ?")
            .bind(parent_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Promotes the current snapshot to the previous one: name, mtime and
    /// parent. Called after the corresponding local action succeeded, so
    /// the next classification treats the entry as unchanged.
    pub async fn promote_prev_to_cur(&self, id: &str) -> Result<(), CatalogError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE entries SET \
             prev_remote_modification_time = cur_remote_modification_time, \
             prev_remote_name = cur_remote_name \
             WHERE id = ?",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE parent_links SET prev_parent_id = cur_parent_id WHERE file_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn set_removed_remotely(&self, id: &str) -> Result<(), CatalogError> {
        sqlx::query("UPDATE entries SET removed_remotely = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_removed_locally(&self, id: &str, removed: bool) -> Result<(), CatalogError> {
        sqlx::query("UPDATE entries SET removed_locally = ? WHERE id = ?")
            .bind(removed as i64)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Clears the locally-removed flag on an entry and everything below
    /// it. Used when move detection reclaims a folder: its contents moved
    /// with it and must not be deleted remotely.
    pub async fn clear_removed_locally_subtree(&self, id: &str) -> Result<(), CatalogError> {
        sqlx::query(
            "WITH RECURSIVE subtree (id) AS ( \
                 SELECT ? \
                 UNION ALL \
                 SELECT pl.file_id FROM parent_links pl \
                 JOIN subtree s ON pl.cur_parent_id = s.id \
             ) \
             UPDATE entries SET removed_locally = 0 \
             WHERE id IN (SELECT id FROM subtree)",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Removes an entry and its parent link.
    pub async fn delete(&self, id: &str) -> Result<(), CatalogError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM entries WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM parent_links WHERE file_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::trace!(id = %id, "deleted entry");
        Ok(())
    }

    pub async fn set_prev_remote_mtime(
        &self,
        id: &str,
        t: DateTime<Utc>,
    ) -> Result<(), CatalogError> {
        sqlx::query("UPDATE entries SET prev_remote_modification_time = ? WHERE id = ?")
            .bind(format_datetime(&t))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Records the local mtime observed after content was written from
    /// (or pushed to) the remote.
    pub async fn set_download_time(&self, id: &str, t: DateTime<Utc>) -> Result<(), CatalogError> {
        sqlx::query("UPDATE entries SET download_time = ? WHERE id = ?")
            .bind(format_datetime(&t))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Lists the children of `parent_id` by current parent link, ordered
    /// by current remote name. This ordering makes the catalog traversal
    /// deterministic and lines it up with sorted filesystem walks.
    pub async fn children_of(&self, parent_id: &str) -> Result<Vec<Entry>, CatalogError> {
        let rows = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM entries \
             JOIN parent_links pl ON entries.id = pl.file_id \
             WHERE pl.cur_parent_id = ? \
             ORDER BY entries.cur_remote_name"
        ))
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            entries.push(entry_from_row(row)?);
        }
        Ok(entries)
    }

    /// Ids of folders deleted locally whose remote deletion is deferred.
    /// Move detection probes these before anything is created remotely.
    pub async fn locally_removed_folder_ids(&self) -> Result<Vec<String>, CatalogError> {
        let rows = sqlx::query(
            "SELECT id FROM entries \
             WHERE removed_locally = 1 AND mime_type = ? \
             ORDER BY cur_remote_name",
        )
        .bind(drivemir_core::domain::FOLDER_MIME_TYPE)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|r| r.get("id")).collect())
    }

    // ========================================================================
    // App state
    // ========================================================================

    /// Reads an app-state value.
    pub async fn state_get(&self, setting: &str) -> Result<Option<String>, CatalogError> {
        let row = sqlx::query("SELECT value FROM app_state WHERE setting = ? LIMIT 1")
            .bind(setting)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get("value")))
    }

    /// Writes an app-state value, replacing any previous one.
    pub async fn state_set(&self, setting: &str, value: &str) -> Result<(), CatalogError> {
        tracing::debug!(setting, value, "updating app state");
        sqlx::query(
            "INSERT INTO app_state (setting, value) VALUES (?, ?) \
             ON CONFLICT (setting) DO UPDATE SET value = excluded.value",
        )
        .bind(setting)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ========================================================================
    // Cleanup
    // ========================================================================

    /// Removes entries that are orphaned (current parent missing from the
    /// catalog), flagged as removed or trashed, or whose current parent
    /// carries any of those flags. A second pass drops parent links whose
    /// entry is gone.
    pub async fn cleanup(&self) -> Result<(), CatalogError> {
        sqlx::query(
            "DELETE FROM entries \
             WHERE id IN ( \
                 SELECT e.id FROM entries e \
                 JOIN parent_links pl ON e.id = pl.file_id \
                 LEFT JOIN entries parent ON parent.id = pl.cur_parent_id \
                 WHERE parent.id IS NULL \
                    OR parent.removed_remotely = 1 \
                    OR parent.trashed = 1 \
                    OR parent.removed_locally = 1 \
                    OR e.removed_remotely = 1 \
                    OR e.removed_locally = 1 \
                    OR e.trashed = 1 \
             )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "DELETE FROM parent_links \
             WHERE file_id IN ( \
                 SELECT pl.file_id FROM parent_links pl \
                 LEFT JOIN entries e ON pl.file_id = e.id \
                 WHERE e.id IS NULL \
             )",
        )
        .execute(&self.pool)
        .await?;

        tracing::debug!("catalog cleanup completed");
        Ok(())
    }
}
