//! Position samples recorded along a tracked path.

use chrono::{DateTime, Utc};

/// A single timestamped coordinate produced by the background service.
///
/// Positions are immutable once appended to a path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// When the sample was taken.
    pub timestamp: DateTime<Utc>,
}

impl Position {
    /// Create a position stamped with the current time.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self::with_timestamp(latitude, longitude, Utc::now())
    }

    /// Create a position with an explicit timestamp.
    pub fn with_timestamp(latitude: f64, longitude: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            latitude,
            longitude,
            timestamp,
        }
    }

    /// Return a position moved by the given distance (metres) along a bearing
    /// (degrees, 0 = North, 90 = East).
    ///
    /// Uses a flat-earth approximation, which is fine for the short hops
    /// between consecutive samples.
    pub fn offset(&self, bearing_deg: f64, distance_m: f64, timestamp: DateTime<Utc>) -> Self {
        const METRES_PER_DEG_LAT: f64 = 111_320.0;

        let bearing = bearing_deg.to_radians();
        let dlat = distance_m * bearing.cos() / METRES_PER_DEG_LAT;
        let lon_scale = METRES_PER_DEG_LAT * self.latitude.to_radians().cos().max(1e-6);
        let dlon = distance_m * bearing.sin() / lon_scale;

        Self::with_timestamp(self.latitude + dlat, self.longitude + dlon, timestamp)
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({:.6}, {:.6}) @ {}",
            self.latitude,
            self.longitude,
            self.timestamp.format("%H:%M:%S%.3f")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_north_increases_latitude() {
        let origin = Position::new(53.5, 10.0);
        let moved = origin.offset(0.0, 1_000.0, origin.timestamp);

        assert!(moved.latitude > origin.latitude);
        assert!((moved.longitude - origin.longitude).abs() < 1e-9);
        assert!((moved.latitude - origin.latitude - 0.00898).abs() < 0.0001);
    }

    #[test]
    fn test_offset_east_increases_longitude() {
        let origin = Position::new(0.0, 10.0);
        let moved = origin.offset(90.0, 1_000.0, origin.timestamp);

        assert!(moved.longitude > origin.longitude);
        assert!((moved.latitude - origin.latitude).abs() < 1e-9);
    }

    #[test]
    fn test_display_contains_coordinates() {
        let position = Position::new(53.123456, 9.654321);
        let text = position.to_string();
        assert!(text.contains("53.123456"));
        assert!(text.contains("9.654321"));
    }
}
