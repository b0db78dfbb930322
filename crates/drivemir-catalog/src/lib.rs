//! drivemir Catalog - durable metadata store
//!
//! SQLite-backed catalog mirroring every known remote object:
//! - One `entries` row per file/folder with last-synced (`prev_*`) and
//!   currently-known (`cur_*`) remote snapshots
//! - One `parent_links` row per non-root entry (single remote parent only)
//! - An `app_state` key/value relation holding the change-feed resume cursor
//!
//! ## Key Components
//!
//! - [`CatalogPool`] - Connection pool with migration support
//! - [`Catalog`] - All entry, parent-link and app-state operations,
//!   including the ancestor-chain path resolver and the cleanup pass
//! - [`CatalogError`] - Error types for catalog operations

pub mod catalog;
pub mod paths;
pub mod pool;

pub use catalog::Catalog;
pub use paths::ParentPaths;
pub use pool::CatalogPool;

/// Key under which the change-feed resume cursor is persisted.
pub const NEXT_CHANGE_TOKEN: &str = "next_change_token";

/// Errors that can occur during catalog operations
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Failed to establish a database connection
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("migration failed: {0}")]
    MigrationFailed(String),

    /// A stored value could not be decoded
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The data model supports exactly one remote parent per entry
    #[error("entry {0} has multiple remote parents")]
    MultipleParents(String),
}

impl From<sqlx::Error> for CatalogError {
    fn from(e: sqlx::Error) -> Self {
        CatalogError::QueryFailed(e.to_string())
    }
}
