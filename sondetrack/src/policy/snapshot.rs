//! Versioned map state published to the rendering layer.
//!
//! A snapshot replaces whatever portion of the map state it declares: a
//! `Some` annotation list is the complete set, not a delta.

use std::fmt;

use serde::Serialize;

use crate::geo::{Coordinate, MapRegion};

/// Which orchestrator produced a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotSource {
    Annotation,
    Camera,
}

impl fmt::Display for SnapshotSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotSource::Annotation => write!(f, "annotation"),
            SnapshotSource::Camera => write!(f, "camera"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnnotationKind {
    Balloon,
    User,
    BurstPoint,
    PredictedLanding,
    Landed,
}

/// A marker on the map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Annotation {
    pub kind: AnnotationKind,
    pub position: Coordinate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Annotation {
    pub fn new(kind: AnnotationKind, position: Coordinate) -> Self {
        Self {
            kind,
            position,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Map orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HeadingMode {
    #[default]
    NorthUp,
    /// Rotated so the balloon is straight ahead of the user.
    BalloonUp,
}

impl HeadingMode {
    pub fn toggled(self) -> Self {
        match self {
            HeadingMode::NorthUp => HeadingMode::BalloonUp,
            HeadingMode::BalloonUp => HeadingMode::NorthUp,
        }
    }
}

/// Where the camera should look.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CameraDirective {
    pub center: Coordinate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zoom: Option<f64>,
    pub heading: HeadingMode,
    /// Map rotation in degrees for balloon-up: the bearing from user to balloon.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearing: Option<f64>,
}

/// One published map update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapStateSnapshot {
    pub source: SnapshotSource,
    pub version: u64,
    /// Request reason that produced this snapshot (diagnostic only).
    pub reason: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Vec<Annotation>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera: Option<CameraDirective>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<MapRegion>,
}

impl MapStateSnapshot {
    /// Annotations of `kind` in this snapshot.
    pub fn annotations_of(&self, kind: AnnotationKind) -> impl Iterator<Item = &Annotation> {
        self.annotations
            .iter()
            .flatten()
            .filter(move |a| a.kind == kind)
    }

    pub fn has_annotation(&self, kind: AnnotationKind) -> bool {
        self.annotations_of(kind).next().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heading_toggle() {
        assert_eq!(HeadingMode::NorthUp.toggled(), HeadingMode::BalloonUp);
        assert_eq!(HeadingMode::BalloonUp.toggled(), HeadingMode::NorthUp);
    }

    #[test]
    fn test_heading_serializes_kebab_case() {
        assert_eq!(serde_json::to_string(&HeadingMode::BalloonUp).unwrap(), "\"balloon-up\"");
        assert_eq!(serde_json::to_string(&HeadingMode::NorthUp).unwrap(), "\"north-up\"");
    }

    #[test]
    fn test_snapshot_serialization_omits_absent_parts() {
        let snapshot = MapStateSnapshot {
            source: SnapshotSource::Annotation,
            version: 3,
            reason: "telemetry",
            annotations: Some(vec![Annotation::new(
                AnnotationKind::Balloon,
                Coordinate::new(48.0, 11.0),
            )
            .with_label("S1")]),
            camera: None,
            region: None,
        };

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["source"], "annotation");
        assert_eq!(json["version"], 3);
        assert_eq!(json["annotations"][0]["kind"], "balloon");
        assert_eq!(json["annotations"][0]["label"], "S1");
        assert!(json.get("camera").is_none());
        assert!(snapshot.has_annotation(AnnotationKind::Balloon));
        assert!(!snapshot.has_annotation(AnnotationKind::Landed));
    }
}
