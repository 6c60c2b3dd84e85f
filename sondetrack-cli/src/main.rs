//! Sondetrack CLI - Command-line interface
//!
//! Replays recorded radiosonde telemetry through the tracker service and
//! manages the configuration file.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod error;

use commands::config::ConfigCommands;
use commands::replay::ReplayArgs;

#[derive(Parser)]
#[command(name = "sondetrack")]
#[command(version, about = "Radiosonde tracking core", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a telemetry recording and print map updates as JSON lines
    Replay {
        /// Recording to replay
        file: PathBuf,

        /// Playback speed multiplier, at least 0.001 (2 = twice as fast)
        #[arg(long, default_value = "1.0")]
        speed: f64,

        /// Configuration file (defaults to the user config.ini)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Manage the configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Replay {
            file,
            speed,
            config,
        } => commands::replay::run(ReplayArgs {
            file,
            speed,
            config,
        }),
        Commands::Config(command) => commands::config::run(command),
    };

    if let Err(e) = result {
        e.exit();
    }
}
