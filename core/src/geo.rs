//! Great-circle distance used for the hub eligibility check.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Default admission radius around the hub reference point, in meters.
pub const ELIGIBILITY_RADIUS_METERS: f64 = 100.0;

/// Haversine distance in meters between two latitude/longitude pairs given in degrees.
///
/// # Examples
///
/// ```
/// use driver_queue_core::geo::haversine_distance;
///
/// assert_eq!(haversine_distance(0.0, 0.0, 0.0, 0.0), 0.0);
///
/// // One degree of latitude is roughly 111 km.
/// let d = haversine_distance(0.0, 0.0, 1.0, 0.0);
/// assert!((d - 111_195.0).abs() < 1.0);
/// ```
#[must_use]
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();
    let lat1 = lat1.to_radians();
    let lat2 = lat2.to_radians();

    // Rounding can push `a` just past 1 for near-antipodal points.
    let a = ((delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2))
    .clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

/// A position in decimal degrees.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
}

impl Coordinates {
    /// Create a coordinate pair
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Whether both components are finite and within `[-90, 90]` / `[-180, 180]`.
    ///
    /// ```
    /// use driver_queue_core::geo::Coordinates;
    ///
    /// assert!(Coordinates::new(-23.55, -46.63).is_valid());
    /// assert!(!Coordinates::new(f64::NAN, 0.0).is_valid());
    /// assert!(!Coordinates::new(0.0, 181.0).is_valid());
    /// ```
    #[must_use]
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Haversine distance to `other`, in meters.
    #[must_use]
    pub fn distance_to(&self, other: &Self) -> f64 {
        haversine_distance(self.latitude, self.longitude, other.latitude, other.longitude)
    }

    /// Whether `other` lies within `radius_meters` of this point (inclusive).
    ///
    /// A NaN distance is never within range.
    #[must_use]
    pub fn is_within(&self, other: &Self, radius_meters: f64) -> bool {
        self.distance_to(other) <= radius_meters
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}
