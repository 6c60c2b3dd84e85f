//! Geographic primitives shared by the tracking components.
//!
//! Distances use the haversine great-circle formula on a spherical earth, which
//! is well within the accuracy needed for recentring thresholds (tens of metres)
//! and signal-loss fallbacks (tens of kilometres).

use serde::{Deserialize, Serialize};

/// Mean earth radius in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Minimum span (degrees) of a fitted region, so a single point still yields
/// a usable viewport.
const MIN_REGION_SPAN_DEG: f64 = 0.01;

/// A WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Zero/zero is what receivers emit before they have a GPS fix.
    pub fn is_null_island(&self) -> bool {
        self.latitude == 0.0 && self.longitude == 0.0
    }

    /// Whether both components are finite and inside their valid ranges.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Great-circle distance to `other` in metres.
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = lat2 - lat1;
        let dlon = (other.longitude - self.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_M * c
    }

    /// Initial bearing towards `other` in degrees (0-360, 0 = north).
    pub fn bearing_to(&self, other: &Coordinate) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlon = (other.longitude - self.longitude).to_radians();

        let y = dlon.sin() * lat2.cos();
        let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
        let bearing = y.atan2(x).to_degrees();

        if bearing < 0.0 {
            bearing + 360.0
        } else {
            bearing
        }
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.5}°, {:.5}°", self.latitude, self.longitude)
    }
}

/// Arithmetic mean of a set of positions.
///
/// Returns `None` for an empty input. Plain component averaging is used; the
/// positions averaged here are a landed balloon's jitter, never spread across
/// the antimeridian.
pub fn mean_coordinate<'a, I>(points: I) -> Option<Coordinate>
where
    I: IntoIterator<Item = &'a Coordinate>,
{
    let (count, lat_sum, lon_sum) = points
        .into_iter()
        .fold((0usize, 0.0, 0.0), |(n, lat, lon), p| {
            (n + 1, lat + p.latitude, lon + p.longitude)
        });

    if count == 0 {
        return None;
    }

    Some(Coordinate::new(
        lat_sum / count as f64,
        lon_sum / count as f64,
    ))
}

/// A rectangular map viewport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapRegion {
    pub center: Coordinate,
    /// Latitude extent in degrees.
    pub latitude_span: f64,
    /// Longitude extent in degrees.
    pub longitude_span: f64,
}

impl MapRegion {
    /// Smallest region containing all `points`, enlarged by `padding`
    /// (a fraction of the span added on each side).
    pub fn fitting(points: &[Coordinate], padding: f64) -> Option<Self> {
        let first = points.first()?;
        let (mut min_lat, mut max_lat) = (first.latitude, first.latitude);
        let (mut min_lon, mut max_lon) = (first.longitude, first.longitude);

        for p in &points[1..] {
            min_lat = min_lat.min(p.latitude);
            max_lat = max_lat.max(p.latitude);
            min_lon = min_lon.min(p.longitude);
            max_lon = max_lon.max(p.longitude);
        }

        let scale = 1.0 + 2.0 * padding.max(0.0);
        Some(Self {
            center: Coordinate::new((min_lat + max_lat) / 2.0, (min_lon + max_lon) / 2.0),
            latitude_span: ((max_lat - min_lat) * scale).max(MIN_REGION_SPAN_DEG),
            longitude_span: ((max_lon - min_lon) * scale).max(MIN_REGION_SPAN_DEG),
        })
    }

    pub fn contains(&self, point: &Coordinate) -> bool {
        (point.latitude - self.center.latitude).abs() <= self.latitude_span / 2.0
            && (point.longitude - self.center.longitude).abs() <= self.longitude_span / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_zero_for_same_point() {
        let p = Coordinate::new(52.52, 13.40);
        assert!(p.distance_to(&p).abs() < 1e-6);
    }

    #[test]
    fn test_distance_one_degree_latitude() {
        let a = Coordinate::new(50.0, 8.0);
        let b = Coordinate::new(51.0, 8.0);
        let d = a.distance_to(&b);
        // One degree of latitude is ~111.2 km
        assert!((d - 111_195.0).abs() < 200.0, "got {d}");
    }

    #[test]
    fn test_distance_is_symmetric() {
        let a = Coordinate::new(48.1, 11.5);
        let b = Coordinate::new(48.3, 11.9);
        assert!((a.distance_to(&b) - b.distance_to(&a)).abs() < 1e-6);
    }

    #[test]
    fn test_bearing_cardinal_directions() {
        let origin = Coordinate::new(0.0, 0.0);
        assert!((origin.bearing_to(&Coordinate::new(1.0, 0.0)) - 0.0).abs() < 0.1);
        assert!((origin.bearing_to(&Coordinate::new(0.0, 1.0)) - 90.0).abs() < 0.1);
        assert!((origin.bearing_to(&Coordinate::new(-1.0, 0.0)) - 180.0).abs() < 0.1);
        assert!((origin.bearing_to(&Coordinate::new(0.0, -1.0)) - 270.0).abs() < 0.1);
    }

    #[test]
    fn test_null_island_and_validity() {
        assert!(Coordinate::new(0.0, 0.0).is_null_island());
        assert!(!Coordinate::new(0.0, 0.1).is_null_island());
        assert!(!Coordinate::new(f64::NAN, 1.0).is_valid());
        assert!(!Coordinate::new(91.0, 1.0).is_valid());
        assert!(Coordinate::new(-33.9, 151.2).is_valid());
    }

    #[test]
    fn test_mean_coordinate() {
        let points = [
            Coordinate::new(50.0, 8.0),
            Coordinate::new(50.2, 8.2),
            Coordinate::new(50.4, 8.4),
        ];
        let mean = mean_coordinate(points.iter()).unwrap();
        assert!((mean.latitude - 50.2).abs() < 1e-9);
        assert!((mean.longitude - 8.2).abs() < 1e-9);

        assert!(mean_coordinate(std::iter::empty::<&Coordinate>()).is_none());
    }

    #[test]
    fn test_region_fitting_contains_all_points() {
        let points = [
            Coordinate::new(50.0, 8.0),
            Coordinate::new(50.5, 9.0),
            Coordinate::new(49.8, 8.4),
        ];
        let region = MapRegion::fitting(&points, 0.1).unwrap();
        for p in &points {
            assert!(region.contains(p), "{p} outside {region:?}");
        }
        assert!(region.latitude_span > 0.7);
    }

    #[test]
    fn test_region_fitting_single_point_has_minimum_span() {
        let region = MapRegion::fitting(&[Coordinate::new(10.0, 10.0)], 0.2).unwrap();
        assert_eq!(region.latitude_span, MIN_REGION_SPAN_DEG);
        assert!(MapRegion::fitting(&[], 0.2).is_none());
    }
}
