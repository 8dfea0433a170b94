//! Direction and distance to the Kaaba.

use std::fmt;

use crate::error::OrientationError;
use crate::prayer::Coordinates;

pub const KAABA: Coordinates = Coordinates {
    latitude: 21.422487,
    longitude: 39.826206,
};

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Below this, two points are treated as the same place (10 m).
const SAME_PLACE_KM: f64 = 0.01;

/// Great-circle distance in kilometres (haversine). Returns 0 under 10 m.
pub fn distance_km(from: Coordinates, to: Coordinates) -> f64 {
    let d_lat = (to.latitude - from.latitude).to_radians();
    let d_lon = (to.longitude - from.longitude).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + from.latitude.to_radians().cos()
            * to.latitude.to_radians().cos()
            * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    let distance = EARTH_RADIUS_KM * c;

    if distance < SAME_PLACE_KM { 0.0 } else { distance }
}

/// Initial great-circle bearing to the Kaaba, clockwise from true north,
/// in `[0, 360)`. At the Kaaba itself the bearing is 0.
pub fn qibla_direction(from: Coordinates) -> f64 {
    if distance_km(from, KAABA) < SAME_PLACE_KM {
        return 0.0;
    }

    let lat1 = from.latitude.to_radians();
    let lat2 = KAABA.latitude.to_radians();
    let d_lon = (KAABA.longitude - from.longitude).to_radians();

    let y = d_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lon.cos();
    normalize(y.atan2(x).to_degrees())
}

/// Where the Qibla lies relative to the way the device is facing,
/// clockwise from the heading.
///
/// `heading` is a compass reading in degrees from true north. A reading
/// that is not a number or lies outside `[0, 360]` is treated as missing
/// sensor data.
pub fn relative_bearing(qibla: f64, heading: f64) -> Result<f64, OrientationError> {
    if !heading.is_finite() || !(0.0..=360.0).contains(&heading) {
        return Err(OrientationError::DataUnavailable);
    }
    Ok(normalize(qibla - heading))
}

/// Eight-point compass label for a bearing.
pub fn cardinal(bearing: f64) -> &'static str {
    const POINTS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];
    let index = ((normalize(bearing) + 22.5) / 45.0) as usize % 8;
    POINTS[index]
}

fn normalize(degrees: f64) -> f64 {
    let d = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negatives
    if d >= 360.0 { 0.0 } else { d }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationAccuracy {
    High,
    Medium,
    Low,
    Unknown,
}

impl LocationAccuracy {
    pub fn classify(accuracy_m: Option<f64>) -> Self {
        match accuracy_m {
            Some(m) if m > 0.0 && m <= 15.0 => Self::High,
            Some(m) if m > 0.0 && m <= 30.0 => Self::Medium,
            Some(m) if m > 0.0 => Self::Low,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for LocationAccuracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
