//! First-run configuration bootstrap
//!
//! When no config file exists yet a default one is created, asking the
//! user once where the mirrored drive folder should live. An existing
//! but unreadable config is an error, never silently replaced.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use drivemir_core::config::Config;

/// Reads the configuration, creating it with a prompted drive path when
/// the file does not exist yet. `prompt` receives the default value and
/// returns the user's answer (empty keeps the default).
pub fn read_or_create(
    path: &Path,
    prompt: impl FnOnce(&str) -> Result<String>,
) -> Result<Config> {
    match Config::load(path) {
        Ok(config) => Ok(config),
        Err(err) if path.exists() => {
            Err(err).with_context(|| format!("unreadable config at {}", path.display()))
        }
        Err(_) => {
            let config_dir = path.parent().unwrap_or(Path::new("."));
            let mut config = Config::default_in(config_dir);

            let answer = prompt(&config.drive_path)?;
            let answer = answer.trim();
            if !answer.is_empty() {
                let mut drive_path = answer.to_string();
                if !drive_path.ends_with(std::path::MAIN_SEPARATOR) {
                    drive_path.push(std::path::MAIN_SEPARATOR);
                }
                config.drive_path = drive_path;
            }

            config
                .save(path)
                .with_context(|| format!("could not save config to {}", path.display()))?;
            Ok(config)
        }
    }
}

/// Interactive prompter used by the binary.
pub fn prompt_on_stdin(default_path: &str) -> Result<String> {
    print!("Store the mirrored drive folder in ({default_path}): ");
    std::io::stdout().flush().context("could not flush stdout")?;

    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("could not read the drive folder answer")?;
    Ok(line)
}
