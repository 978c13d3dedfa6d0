//! Great-circle geometry on a spherical Earth.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters (IUGG).
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Length of one degree of latitude, in meters, on the mean sphere.
pub const METERS_PER_DEGREE_LAT: f64 = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        GeoPoint { lat, lon }
    }

    /// True when both coordinates are finite and inside the WGS84 ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

/// Great-circle distance in meters between two points (haversine).
///
/// Symmetric, zero for identical points and never negative. Non-finite
/// coordinates propagate as NaN; callers validate points beforehand.
pub fn distance(a: GeoPoint, b: GeoPoint) -> f64 {
    if a == b {
        return 0.0;
    }
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let half_dlat = ((b.lat - a.lat).to_radians() / 2.0).sin();
    let half_dlon = ((b.lon - a.lon).to_radians() / 2.0).sin();

    let h = half_dlat * half_dlat + lat1.cos() * lat2.cos() * half_dlon * half_dlon;
    // Rounding can push h a hair outside [0, 1] for near-antipodal points.
    let h = h.clamp(0.0, 1.0);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Length of one degree of longitude, in meters, at the given latitude.
pub fn meters_per_degree_lon(lat: f64) -> f64 {
    METERS_PER_DEGREE_LAT * lat.to_radians().cos().abs()
}
