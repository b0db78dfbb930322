//! Change classification kinds
//!
//! For each catalog entry the reconciler determines *independently* whether
//! it changed on the local side and on the remote side, then picks an action
//! from the cross product of the two classifications.

use std::fmt;

/// What happened to the entry on the local filesystem since the last apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalChange {
    /// Not on disk and never realized locally (`download_time` unset).
    NotExist,
    /// On disk, unchanged since the last apply.
    NotChanged,
    /// On disk with content that differs from the last apply.
    Updated,
    /// Previously realized locally (`download_time` set) but gone from disk.
    Deleted,
}

/// What happened to the entry on the remote since the last apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteChange {
    NotChanged,
    /// Remote mtime advanced past the last-applied snapshot.
    Updated,
    /// Renamed or re-parented: previous and current paths diverge.
    Moved,
    /// Removed, trashed, or under a trashed ancestor.
    Deleted,
}

impl fmt::Display for LocalChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalChange::NotExist => write!(f, "not_exist"),
            LocalChange::NotChanged => write!(f, "not_changed"),
            LocalChange::Updated => write!(f, "updated"),
            LocalChange::Deleted => write!(f, "deleted"),
        }
    }
}

impl fmt::Display for RemoteChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteChange::NotChanged => write!(f, "not_changed"),
            RemoteChange::Updated => write!(f, "updated"),
            RemoteChange::Moved => write!(f, "moved"),
            RemoteChange::Deleted => write!(f, "deleted"),
        }
    }
}
