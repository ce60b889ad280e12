//! `config` command: show the effective configuration.

use std::path::Path;

use trailkeeper::config::ConfigFile;
use trailkeeper::TrackerConfig;

use crate::error::CliError;

/// Print the configuration file location and every effective setting.
pub fn run(config: &TrackerConfig, explicit_path: Option<&Path>) -> Result<(), CliError> {
    let path = explicit_path
        .map(Path::to_path_buf)
        .or_else(ConfigFile::default_path);

    match &path {
        Some(path) if path.exists() => println!("Config file: {}", path.display()),
        Some(path) => println!("Config file: {} (not found, using defaults)", path.display()),
        None => println!("Config file: (no config directory, using defaults)"),
    }
    println!();

    println!("[session]");
    println!(
        "  follow_delay_ms  = {}",
        config.session.follow_delay.as_millis()
    );
    println!(
        "  start_timeout_ms = {}",
        config.session.start_timeout.as_millis()
    );
    println!(
        "  stop_timeout_ms  = {}",
        config.session.stop_timeout.as_millis()
    );
    println!();

    println!("[logging]");
    println!("  level       = {}", config.logging.level);
    match &config.logging.directory {
        Some(directory) => println!("  directory   = {}", directory.display()),
        None => println!("  directory   = (not set, stderr only)"),
    }
    println!("  file_prefix = {}", config.logging.file_prefix);

    Ok(())
}
