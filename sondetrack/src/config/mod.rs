//! Configuration.
//!
//! Each component owns a config struct with `Default` carrying its tuned
//! constants ([`SchedulerConfig`](crate::scheduler::SchedulerConfig),
//! [`TelemetryConfig`](crate::telemetry::TelemetryConfig),
//! [`ModeMachineConfig`](crate::mode::ModeMachineConfig),
//! [`PolicyConfig`](crate::policy::PolicyConfig)). [`TrackerConfig`] bundles
//! them; [`ConfigFile`] adds logging and maps the bundle to `config.ini`.
//!
//! # Example
//!
//! ```ignore
//! use sondetrack::config::ConfigFile;
//!
//! let config = ConfigFile::load()?;
//! let service = TrackerService::new(config.tracker, store, snapshot_tx);
//! ```

mod file;
mod parser;
mod settings;
mod writer;

pub use file::ConfigFileError;
pub use settings::{
    config_directory, config_file_path, default_log_dir, default_log_file, ConfigFile,
    LoggingSettings, TrackerConfig,
};
