//! Trailkeeper CLI - Command-line interface
//!
//! Runs the tracking library against a simulated background location
//! service and prints what the session does.

mod commands;
mod error;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use trailkeeper::config::ConfigFile;
use trailkeeper::TrackerConfig;

use crate::commands::simulate::SimulateArgs;
use crate::error::CliError;

#[derive(Debug, Parser)]
#[command(name = "trailkeeper", version, about = "Live location path tracking")]
struct Cli {
    /// Path to the configuration file (defaults to the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a tracking session against a simulated location service
    Simulate(SimulateArgs),

    /// Show the effective configuration
    Config,
}

fn load_config(path: Option<&PathBuf>) -> Result<TrackerConfig, CliError> {
    let config = match path {
        Some(path) => ConfigFile::load(path)?,
        None => ConfigFile::load_default()?,
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match load_config(cli.config.as_ref()) {
        Ok(config) => match cli.command {
            Commands::Simulate(args) => commands::simulate::run(config, args).await,
            Commands::Config => commands::config::run(&config, cli.config.as_deref()),
        },
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
