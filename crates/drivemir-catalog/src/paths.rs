//! Ancestor-chain queries: path resolution and the trashed-ancestor probe
//!
//! The catalog stores parent *links*, not paths. Whenever the engine needs
//! a path it is resolved here by walking the parent chain with recursive
//! CTEs — once over the `prev_*` snapshot and once over the `cur_*` one,
//! since the two can disagree after a remote move.
//!
//! Resolved paths are relative to the drive mount point and use `/` as the
//! internal separator regardless of platform; callers convert to OS paths
//! by splitting on it.

use sqlx::Row;

use drivemir_core::domain::Entry;

use crate::{Catalog, CatalogError};

/// The previous and current parent-folder paths of an entry, exclusive of
/// the entry's own name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentPaths {
    pub prev: String,
    pub cur: String,
}

impl Catalog {
    /// Resolves the previous and current parent-folder paths of an entry
    /// by walking both parent chains up to the root.
    ///
    /// Returns `None` when either chain cannot be resolved — typically the
    /// entry or one of its ancestors has already been removed from the
    /// catalog. Callers skip such entries; cleanup collects them.
    pub async fn parent_paths(&self, id: &str) -> Result<Option<ParentPaths>, CatalogError> {
        let row = sqlx::query(
            "WITH RECURSIVE \
             prev_chain (depth, parent_id, name) AS ( \
                 SELECT 0, pl.prev_parent_id, p.prev_remote_name \
                 FROM parent_links pl JOIN entries p ON p.id = pl.prev_parent_id \
                 WHERE pl.file_id = ?1 \
                 UNION ALL \
                 SELECT c.depth + 1, pl.prev_parent_id, p.prev_remote_name \
                 FROM prev_chain c \
                 JOIN parent_links pl ON pl.file_id = c.parent_id \
                 JOIN entries p ON p.id = pl.prev_parent_id \
             ), \
             cur_chain (depth, parent_id, name) AS ( \
                 SELECT 0, pl.cur_parent_id, p.cur_remote_name \
                 FROM parent_links pl JOIN entries p ON p.id = pl.cur_parent_id \
                 WHERE pl.file_id = ?1 \
                 UNION ALL \
                 SELECT c.depth + 1, pl.cur_parent_id, p.cur_remote_name \
                 FROM cur_chain c \
                 JOIN parent_links pl ON pl.file_id = c.parent_id \
                 JOIN entries p ON p.id = pl.cur_parent_id \
             ) \
             SELECT \
                 (SELECT group_concat(name, '/') FROM \
                     (SELECT name FROM prev_chain ORDER BY depth DESC)) AS prev_path, \
                 (SELECT group_concat(name, '/') FROM \
                     (SELECT name FROM cur_chain ORDER BY depth DESC)) AS cur_path",
        )
        .bind(id)
        .fetch_one(self.pool())
        .await?;

        let prev: Option<String> = row.get("prev_path");
        let cur: Option<String> = row.get("cur_path");

        match (prev, cur) {
            (Some(prev), Some(cur)) => Ok(Some(ParentPaths { prev, cur })),
            _ => Ok(None),
        }
    }

    /// Returns the current parent id of an entry, if it has a parent link.
    pub async fn parent_of(&self, id: &str) -> Result<Option<String>, CatalogError> {
        let row = sqlx::query("SELECT cur_parent_id FROM parent_links WHERE file_id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;

        Ok(row.map(|r| r.get("cur_parent_id")))
    }

    /// Resolves an entry id from a path relative to the drive mount point.
    ///
    /// The first component must be the root folder's current name; each
    /// further component is looked up by current name under the current
    /// parent. Returns `None` if any step fails to resolve — which is how
    /// the local walker recognizes an object the catalog has never seen.
    pub async fn resolve_id_by_current_path(
        &self,
        rel_path: &str,
        root: &Entry,
    ) -> Result<Option<String>, CatalogError> {
        let mut components = rel_path
            .split(['/', std::path::MAIN_SEPARATOR])
            .filter(|c| !c.is_empty());

        match components.next() {
            Some(first) if first == root.cur_remote_name => {}
            _ => return Ok(None),
        }

        let mut current_id = root.id.clone();
        for name in components {
            let row = sqlx::query(
                "SELECT e.id FROM entries e \
                 JOIN parent_links pl ON e.id = pl.file_id \
                 WHERE e.cur_remote_name = ? AND pl.cur_parent_id = ? \
                 LIMIT 1",
            )
            .bind(name)
            .bind(&current_id)
            .fetch_optional(self.pool())
            .await?;

            match row {
                Some(r) => current_id = r.get("id"),
                None => return Ok(None),
            }
        }

        Ok(Some(current_id))
    }

    /// Returns true when any ancestor along the current parent chain is
    /// trashed. Such an entry is as good as deleted remotely even if its
    /// own trash flag is clear.
    pub async fn has_trashed_ancestor(&self, id: &str) -> Result<bool, CatalogError> {
        let row = sqlx::query(
            "WITH RECURSIVE ancestors (id) AS ( \
                 SELECT pl.cur_parent_id FROM parent_links pl WHERE pl.file_id = ? \
                 UNION ALL \
                 SELECT pl.cur_parent_id FROM parent_links pl \
                 JOIN ancestors a ON pl.file_id = a.id \
             ) \
             SELECT 1 FROM ancestors a \
             JOIN entries e ON e.id = a.id \
             WHERE e.trashed = 1 \
             LIMIT 1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.is_some())
    }
}
