//! OAuth token cache loading
//!
//! The token file is user-provisioned (the same layout the stock OAuth
//! tooling writes): `access_token`, optional `refresh_token`, optional
//! `expiry`. Refresh is out of scope here; an expired token surfaces as
//! an error telling the user to renew the file.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::DriveError;

/// Name of the token cache file inside the configuration directory.
pub const TOKEN_FILE: &str = "token.json";

/// Serialized OAuth2 token as stored in `token.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

impl StoredToken {
    /// Returns true when the token carries an expiry in the past.
    pub fn is_expired(&self) -> bool {
        match self.expiry {
            Some(expiry) => Utc::now() >= expiry,
            None => false,
        }
    }
}

/// Loads the token cache from `<config_dir>/token.json`.
pub fn load_token(config_dir: &Path) -> Result<StoredToken, DriveError> {
    let path = config_dir.join(TOKEN_FILE);
    let content = std::fs::read_to_string(&path).map_err(|e| {
        DriveError::TokenCache(format!("could not read {}: {}", path.display(), e))
    })?;
    let token: StoredToken = serde_json::from_str(&content).map_err(|e| {
        DriveError::TokenCache(format!("could not parse {}: {}", path.display(), e))
    })?;

    if token.is_expired() {
        return Err(DriveError::TokenCache(format!(
            "token in {} is expired; renew it and try again",
            path.display()
        )));
    }

    Ok(token)
}
