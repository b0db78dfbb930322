//! Port definitions (traits for adapters)

pub mod remote_drive;

pub use remote_drive::{
    ByteStream, ChangePage, FilePage, IRemoteDrive, RemoteChangeRecord, RemoteFileMeta,
};
