//! Settings structs loaded from `config.ini`.

use std::path::PathBuf;

use crate::mode::ModeMachineConfig;
use crate::policy::PolicyConfig;
use crate::scheduler::SchedulerConfig;
use crate::telemetry::TelemetryConfig;

/// Everything the tracker service needs to run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackerConfig {
    pub scheduler: SchedulerConfig,
    pub telemetry: TelemetryConfig,
    pub mode: ModeMachineConfig,
    pub policy: PolicyConfig,
}

/// Log output location.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    pub directory: PathBuf,
    pub file: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: default_log_dir(),
            file: default_log_file().to_string(),
        }
    }
}

/// Contents of the user configuration file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    pub tracker: TrackerConfig,
    pub logging: LoggingSettings,
}

/// Directory holding `config.ini`.
pub fn config_directory() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sondetrack")
}

/// Default location of the configuration file.
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}

/// Default directory for log files.
pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("sondetrack").join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"))
}

/// Default log file name.
pub fn default_log_file() -> &'static str {
    "sondetrack.log"
}
