//! Events delivered to the tracker service.

use crate::geo::Coordinate;
use crate::mode::Mode;
use crate::prediction::LandingPrediction;
use crate::telemetry::TelemetrySample;

/// Operator input from the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum UiCommand {
    /// Force the operating mode.
    SetMode(Mode),
    /// The user dragged the map.
    CameraPan,
    /// The user changed the zoom level.
    CameraZoom(f64),
    /// Switch north-up / balloon-up.
    ToggleHeading,
}

/// Input to the tracker service.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    /// A decoded sample from the radio link.
    Telemetry(TelemetrySample),
    /// The user's own position.
    Location(Coordinate),
    /// A new landing prediction.
    Prediction(LandingPrediction),
    Command(UiCommand),
}

impl TrackerEvent {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            TrackerEvent::Telemetry(_) => "telemetry",
            TrackerEvent::Location(_) => "location",
            TrackerEvent::Prediction(_) => "prediction",
            TrackerEvent::Command(_) => "command",
        }
    }
}

impl From<TelemetrySample> for TrackerEvent {
    fn from(sample: TelemetrySample) -> Self {
        TrackerEvent::Telemetry(sample)
    }
}

impl From<UiCommand> for TrackerEvent {
    fn from(command: UiCommand) -> Self {
        TrackerEvent::Command(command)
    }
}
