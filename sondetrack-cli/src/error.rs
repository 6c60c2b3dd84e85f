//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::path::PathBuf;
use std::process;

use sondetrack::config::ConfigFileError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(std::io::Error),
    /// Configuration file could not be loaded or saved
    Config(ConfigFileError),
    /// Invalid command-line argument
    InvalidArgument(String),
    /// Failed to read a recording
    FileRead { path: PathBuf, error: std::io::Error },
    /// Failed to start the async runtime or install the signal handler
    Runtime(String),
    /// Failed to write output
    Output(serde_json::Error),
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Config(ConfigFileError::InvalidValue { .. }) => {
                eprintln!();
                eprintln!("Fix the value in config.ini, or regenerate a fresh file with:");
                eprintln!("  sondetrack config init --force");
            }
            CliError::FileRead { .. } => {
                eprintln!();
                eprintln!("Recordings are plain text, one record per line:");
                eprintln!("  T,<rfc3339>,name,lat,lon,alt,vs,hs,rssi");
                eprintln!("  L,<rfc3339>,lat,lon");
                eprintln!("  P,<rfc3339>,lat,lon[,burst_lat,burst_lon]");
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(e) => write!(f, "Failed to initialize logging: {}", e),
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
            CliError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            CliError::FileRead { path, error } => {
                write!(f, "Failed to read '{}': {}", path.display(), error)
            }
            CliError::Runtime(msg) => write!(f, "Runtime error: {}", msg),
            CliError::Output(e) => write!(f, "Failed to write output: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::LoggingInit(e) => Some(e),
            CliError::Config(e) => Some(e),
            CliError::FileRead { error, .. } => Some(error),
            CliError::Output(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Output(e)
    }
}
