//! Configuration management CLI commands.
//!
//! Provides `config show`, `config path` and `config init`.

use clap::Subcommand;
use sondetrack::config::{config_file_path, ConfigFile};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration (file values over defaults)
    Show,

    /// Show the configuration file path
    Path,

    /// Write a fully populated configuration file
    Init {
        /// Overwrite an existing file with defaults
        #[arg(long)]
        force: bool,
    },
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show => run_show(),
        ConfigCommands::Path => run_path(),
        ConfigCommands::Init { force } => run_init(force),
    }
}

fn run_show() -> Result<(), CliError> {
    let config = ConfigFile::load()?;
    println!("; {}", config_file_path().display());
    print!("{}", config.to_ini_string());
    Ok(())
}

fn run_path() -> Result<(), CliError> {
    println!("{}", config_file_path().display());
    Ok(())
}

/// Write the config file.
///
/// An existing file is re-saved with its values kept and any missing keys
/// filled in, unless `force` resets it to defaults.
fn run_init(force: bool) -> Result<(), CliError> {
    let path = config_file_path();
    let config = if force {
        ConfigFile::default()
    } else {
        ConfigFile::load()?
    };
    config.save()?;

    println!("Configuration file: {}", path.display());
    println!();
    println!("Edit this file to tune telemetry smoothing, mode thresholds and map policies.");
    println!("`sondetrack replay --config <PATH>` uses a different file for one run.");
    Ok(())
}
