//! Configuration module for drivemir.
//!
//! The configuration lives in `<config_dir>/config.json` next to the
//! catalog database and the token cache. Loading, defaults and validation
//! live here; interactive bootstrapping (prompting for a missing drive
//! path) is the CLI's job.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Application name; used for the per-user configuration directory.
pub const APP_NAME: &str = "drivemir";

/// Top-level configuration for drivemir.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Location of the catalog database.
    pub db_path: PathBuf,
    /// Pagination size for remote list/changes calls.
    pub page_size_to_query: i64,
    /// Local mount point holding the mirrored root folder. Must be an
    /// absolute path terminated with the OS path separator.
    pub drive_path: String,
    /// Truncate threshold for the log file, in bytes.
    pub log_file_max_size: u64,
    /// 0 = error, 1 = info, 2 = warning, 3 = debug.
    pub log_verbosity: u8,
}

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Name of the offending key, e.g. `"drive_path"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl Config {
    /// Platform-appropriate configuration directory,
    /// typically `$XDG_CONFIG_HOME/drivemir` on Linux.
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join(APP_NAME)
    }

    /// Default path of the configuration file.
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.json")
    }

    /// Default configuration anchored at `config_dir`.
    ///
    /// The drive path defaults to the user's home directory,
    /// separator-terminated as the walker expects.
    pub fn default_in(config_dir: &Path) -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));
        let mut drive_path = home.to_string_lossy().into_owned();
        if !drive_path.ends_with(std::path::MAIN_SEPARATOR) {
            drive_path.push(std::path::MAIN_SEPARATOR);
        }
        Self {
            db_path: config_dir.join("sync.db"),
            page_size_to_query: 300,
            drive_path,
            log_file_max_size: 10_000_000,
            log_verbosity: 1,
        }
    }

    /// Load configuration from a JSON file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Write the configuration as pretty-printed JSON, creating parent
    /// directories as needed.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.page_size_to_query < 1 || self.page_size_to_query > 1000 {
            errors.push(ValidationError {
                field: "page_size_to_query".into(),
                message: "must be in range 1..=1000".into(),
            });
        }

        if !Path::new(&self.drive_path).is_absolute() {
            errors.push(ValidationError {
                field: "drive_path".into(),
                message: format!("must be an absolute path: {}", self.drive_path),
            });
        }
        if !self.drive_path.ends_with(std::path::MAIN_SEPARATOR) {
            errors.push(ValidationError {
                field: "drive_path".into(),
                message: "must be terminated with the path separator".into(),
            });
        }

        if self.log_file_max_size == 0 {
            errors.push(ValidationError {
                field: "log_file_max_size".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.log_verbosity > 3 {
            errors.push(ValidationError {
                field: "log_verbosity".into(),
                message: "must be in range 0..=3".into(),
            });
        }

        errors
    }

    /// The tracing filter directive matching the configured verbosity.
    pub fn log_filter(&self) -> &'static str {
        match self.log_verbosity {
            0 => "error",
            1 => "info",
            2 => "warn",
            _ => "debug",
        }
    }
}
