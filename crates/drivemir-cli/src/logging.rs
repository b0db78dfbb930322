//! Logging setup
//!
//! Logs go to a file next to the catalog so unattended runs (cron,
//! timers) leave a trail. The file is truncated once it exceeds the
//! configured threshold; full rotation is deliberately not provided.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use drivemir_core::config::Config;

/// Name of the log file inside the configuration directory.
const LOG_FILE: &str = "drivemir.log";

pub fn init(config: &Config) -> Result<()> {
    let log_path = Config::config_dir().join(LOG_FILE);
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("could not create {}", parent.display()))?;
    }

    // Truncate an oversized log before appending to it
    if let Ok(meta) = std::fs::metadata(&log_path) {
        if meta.len() > config.log_file_max_size {
            std::fs::File::create(&log_path)
                .with_context(|| format!("could not truncate {}", log_path.display()))?;
        }
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("could not open log file {}", log_path.display()))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(false)
        .with_writer(Arc::new(file))
        .init();

    Ok(())
}
