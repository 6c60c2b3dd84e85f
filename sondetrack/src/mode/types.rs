//! Operating modes and their static configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operating mode of the tracker.
///
/// - Explore: no balloon to chase (pre-launch, signal lost, too far away)
/// - Follow: balloon in flight with a solid signal
/// - FinalApproach: balloon about to land or close by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    #[default]
    Explore,
    Follow,
    FinalApproach,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::Explore, Mode::Follow, Mode::FinalApproach];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Explore => "explore",
            Mode::Follow => "follow",
            Mode::FinalApproach => "final-approach",
        }
    }

    /// Static configuration for this mode.
    pub fn config(&self) -> ModeConfig {
        match self {
            Mode::Explore => ModeConfig {
                prediction_interval: Duration::from_secs(300),
                routing_enabled: false,
                camera_follow_enabled: false,
                update_frequency: UpdateFrequency::Low,
            },
            Mode::Follow => ModeConfig {
                prediction_interval: Duration::from_secs(120),
                routing_enabled: true,
                camera_follow_enabled: true,
                update_frequency: UpdateFrequency::Normal,
            },
            Mode::FinalApproach => ModeConfig {
                prediction_interval: Duration::from_secs(30),
                routing_enabled: true,
                camera_follow_enabled: true,
                update_frequency: UpdateFrequency::High,
            },
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "explore" => Ok(Mode::Explore),
            "follow" => Ok(Mode::Follow),
            "final-approach" | "final_approach" | "finalapproach" => Ok(Mode::FinalApproach),
            other => Err(format!("unknown mode '{}'", other)),
        }
    }
}

/// How often collaborators should poll while a mode is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateFrequency {
    Low,
    Normal,
    High,
}

impl UpdateFrequency {
    pub fn polling_interval(&self) -> Duration {
        match self {
            UpdateFrequency::Low => Duration::from_secs(60),
            UpdateFrequency::Normal => Duration::from_secs(30),
            UpdateFrequency::High => Duration::from_secs(10),
        }
    }
}

/// Per-mode behaviour switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeConfig {
    /// How often the landing prediction should be refreshed.
    pub prediction_interval: Duration,
    pub routing_enabled: bool,
    pub camera_follow_enabled: bool,
    pub update_frequency: UpdateFrequency,
}

/// Why a transition happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionCause {
    /// The decision rules selected a different mode.
    Evaluated,
    /// An operator override.
    Forced,
}

/// Notification published on every mode change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModeChange {
    pub from: Mode,
    pub to: Mode,
    pub at: DateTime<Utc>,
    pub cause: TransitionCause,
}

/// One entry of the transition history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TransitionRecord {
    pub mode: Mode,
    pub at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_display_and_parse() {
        for mode in Mode::ALL {
            assert_eq!(mode.to_string().parse::<Mode>(), Ok(mode));
        }
        assert_eq!("Final_Approach".parse::<Mode>(), Ok(Mode::FinalApproach));
        assert!("landing".parse::<Mode>().is_err());
    }

    #[test]
    fn test_mode_configs() {
        let explore = Mode::Explore.config();
        assert_eq!(explore.prediction_interval, Duration::from_secs(300));
        assert!(!explore.routing_enabled);
        assert!(!explore.camera_follow_enabled);

        let follow = Mode::Follow.config();
        assert_eq!(follow.prediction_interval, Duration::from_secs(120));
        assert!(follow.routing_enabled && follow.camera_follow_enabled);

        let final_approach = Mode::FinalApproach.config();
        assert_eq!(final_approach.prediction_interval, Duration::from_secs(30));
        assert_eq!(
            final_approach.update_frequency.polling_interval(),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn test_polling_intervals() {
        assert_eq!(UpdateFrequency::Low.polling_interval(), Duration::from_secs(60));
        assert_eq!(UpdateFrequency::Normal.polling_interval(), Duration::from_secs(30));
        assert_eq!(UpdateFrequency::High.polling_interval(), Duration::from_secs(10));
    }

    #[test]
    fn test_mode_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_string(&Mode::FinalApproach).unwrap(),
            "\"final-approach\""
        );
    }
}
