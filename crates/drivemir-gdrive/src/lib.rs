//! drivemir GDrive - Drive v3 REST adapter
//!
//! Implements the `IRemoteDrive` port from `drivemir-core` against the
//! hosted Drive v3 API:
//!
//! - [`DriveClient`] - typed HTTP client covering listing, the change
//!   feed, streaming download, multipart upload, copy, update and delete
//! - [`auth`] - loading of the user-provisioned OAuth token cache
//! - [`DriveError`] - adapter error taxonomy
//!
//! Credential acquisition and refresh are out of scope: the adapter
//! consumes a bearer token from `<config_dir>/token.json` and fails the
//! pass when it no longer works.

pub mod auth;
pub mod client;
pub mod wire;

pub use auth::StoredToken;
pub use client::DriveClient;

/// Errors raised by the Drive adapter.
#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    /// Network-level failure before an HTTP status was obtained
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The token was rejected; the user must re-provision it
    #[error("authentication rejected ({status}): {body}")]
    Auth { status: u16, body: String },

    /// Rate limiting or a server-side failure; safe to retry next run
    #[error("transient remote error ({status}): {body}")]
    Transient { status: u16, body: String },

    /// Any other non-success response
    #[error("api error ({status}): {body}")]
    Api { status: u16, body: String },

    /// A response decoded but carried values the engine cannot use
    #[error("malformed response: {0}")]
    Decode(String),

    /// The token cache file is missing or unreadable
    #[error("token cache: {0}")]
    TokenCache(String),
}
