//! drivemir CLI - one command, one pass
//!
//! Reads (or bootstraps) the configuration, initializes logging, wires
//! the catalog and the Drive adapter into the engine and runs a single
//! synchronization pass. Exits 0 on success, 1 on any unrecovered error.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;

use drivemir_catalog::{Catalog, CatalogPool};
use drivemir_core::config::Config;
use drivemir_gdrive::DriveClient;
use drivemir_sync::SyncEngine;

mod bootstrap;
mod logging;

#[derive(Debug, Parser)]
#[command(
    name = "drivemir",
    version,
    about = "Two-way mirror between a local directory and a hosted drive"
)]
struct Cli {
    /// Use an alternate config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log at debug verbosity regardless of the configured level
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(Config::default_path);
    let mut config = bootstrap::read_or_create(&config_path, bootstrap::prompt_on_stdin)
        .with_context(|| format!("could not load config from {}", config_path.display()))?;
    if cli.verbose {
        config.log_verbosity = 3;
    }

    let errors = config.validate();
    if !errors.is_empty() {
        for error in &errors {
            eprintln!("config error: {error}");
        }
        bail!("invalid configuration in {}", config_path.display());
    }

    logging::init(&config).context("could not initialize logging")?;
    info!(drive_path = %config.drive_path, db = %config.db_path.display(), "starting synchronization");

    let token =
        drivemir_gdrive::auth::load_token(&Config::config_dir()).context("could not load token")?;
    let drive = Arc::new(DriveClient::new(token.access_token));

    let pool = CatalogPool::open(&config.db_path)
        .await
        .context("could not open catalog")?;
    let catalog = Arc::new(Catalog::new(pool.pool().clone()));

    let engine = SyncEngine::new(
        drive,
        catalog,
        PathBuf::from(&config.drive_path),
        config.page_size_to_query,
    );
    engine.run().await?;

    println!("successfully synchronized");
    std::io::stdout().flush().ok();
    Ok(())
}
