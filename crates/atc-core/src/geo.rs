//! Cartesian ↔ geographic coordinate mapping.
//!
//! Physics run entirely in cartesian meters.  Geographic coordinates exist
//! for visualization only and come from a flat-Earth projection around a
//! single reference point (Munich).  At that latitude one degree of latitude
//! spans ~111 km and one degree of longitude ~71.5 km.

/// Reference latitude of the projection origin.
pub const REF_LAT: f64 = 48.1351;
/// Reference longitude of the projection origin.
pub const REF_LON: f64 = 11.582;
/// Meters per degree of latitude near the reference point.
pub const METERS_PER_DEG_LAT: f64 = 111_000.0;
/// Meters per degree of longitude near the reference point.
pub const METERS_PER_DEG_LON: f64 = 71_500.0;

/// A point in cartesian meters relative to the projection origin.
#[derive(Copy, Clone, PartialEq, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct CartPoint {
    pub x: f64,
    pub y: f64,
}

/// A geographic point in degrees.
#[derive(Copy, Clone, PartialEq, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

impl CartPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Project to geographic degrees (flat-Earth approximation).
    pub fn to_geo(self) -> GeoPoint {
        GeoPoint {
            lon: REF_LON + self.x / METERS_PER_DEG_LON,
            lat: REF_LAT + self.y / METERS_PER_DEG_LAT,
        }
    }

    /// Linear interpolation between two points, `t` in `[0, 1]`.
    ///
    /// Used to place a vehicle along a road segment for the streaming
    /// snapshot: `t = position / road_length`.
    pub fn lerp(self, other: CartPoint, t: f64) -> CartPoint {
        let t = t.clamp(0.0, 1.0);
        CartPoint {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }
}
