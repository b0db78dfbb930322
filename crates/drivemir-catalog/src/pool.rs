//! Catalog storage bootstrap
//!
//! Opens the SQLite file behind the catalog and prepares it for a run.
//! The schema is applied on every open — the DDL is all `IF NOT EXISTS`,
//! so re-opening an existing catalog is a no-op. WAL journaling keeps the
//! traversal's reads cheap while the single logical writer applies
//! changes, and a busy timeout absorbs the brief handoffs between the
//! producer and consumer tasks sharing the pool.
//!
//! Tests use [`CatalogPool::in_memory`], which pins exactly one
//! connection: SQLite keeps one in-memory database *per connection*, so
//! a larger pool would scatter the tables across invisible databases.

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::CatalogError;

/// Schema applied on every open.
const SCHEMA: &str = include_str!("migrations/0001_initial.sql");

/// How long a connection waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection pool for the catalog database.
pub struct CatalogPool {
    pool: SqlitePool,
}

impl CatalogPool {
    /// Opens (or creates) the catalog at `db_path` and applies the schema.
    ///
    /// Parent directories are created as needed.
    ///
    /// # Errors
    ///
    /// [`CatalogError::ConnectionFailed`] when the file cannot be opened,
    /// [`CatalogError::MigrationFailed`] when the schema cannot be applied.
    pub async fn open(db_path: &Path) -> Result<Self, CatalogError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CatalogError::ConnectionFailed(format!(
                    "could not create {} for the catalog: {e}",
                    parent.display()
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        // One logical writer per run; the handful of extra connections
        // only ever serve concurrent traversal reads.
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| {
                CatalogError::ConnectionFailed(format!(
                    "could not open catalog {}: {e}",
                    db_path.display()
                ))
            })?;

        apply_schema(&pool).await?;

        tracing::info!(path = %db_path.display(), "catalog opened");
        Ok(Self { pool })
    }

    /// In-memory catalog for tests.
    pub async fn in_memory() -> Result<Self, CatalogError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| {
                CatalogError::ConnectionFailed(format!("could not open in-memory catalog: {e}"))
            })?;

        apply_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// The underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn apply_schema(pool: &SqlitePool) -> Result<(), CatalogError> {
    sqlx::raw_sql(SCHEMA).execute(pool).await.map_err(|e| {
        CatalogError::MigrationFailed(format!("could not apply catalog schema: {e}"))
    })?;
    tracing::debug!("catalog schema applied");
    Ok(())
}
