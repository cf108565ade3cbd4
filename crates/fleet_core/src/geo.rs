//! Geographic primitives: validated points, route legs, great-circle distance
//! and straight-line interpolation between pickup and dropoff.

use serde::{Deserialize, Serialize};

use crate::error::{GeofenceError, GeofenceResult};

/// Earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A WGS84 coordinate. Construction validates the ranges, so every
/// `GeoPoint` in the system is known to be on the globe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGeoPoint")]
pub struct GeoPoint {
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct RawGeoPoint {
    latitude: f64,
    longitude: f64,
}

impl TryFrom<RawGeoPoint> for GeoPoint {
    type Error = GeofenceError;

    fn try_from(raw: RawGeoPoint) -> Result<Self, Self::Error> {
        GeoPoint::new(raw.latitude, raw.longitude)
    }
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> GeofenceResult<Self> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(GeofenceError::InvalidLatitude(latitude));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(GeofenceError::InvalidLongitude(longitude));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

/// Haversine distance between two points in kilometres.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lon1) = (a.latitude.to_radians(), a.longitude.to_radians());
    let (lat2, lon2) = (b.latitude.to_radians(), b.longitude.to_radians());
    let sin_dlat = ((lat2 - lat1) * 0.5).sin();
    let sin_dlon = ((lon2 - lon1) * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// One leg of an itinerary: progress 0.0 is the pickup, 1.0 the dropoff.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
}

impl Route {
    pub fn new(pickup: GeoPoint, dropoff: GeoPoint) -> Self {
        Self { pickup, dropoff }
    }

    /// Great-circle length of the leg.
    pub fn distance_km(&self) -> f64 {
        haversine_km(self.pickup, self.dropoff)
    }
}

/// Position along `route` at `progress`, linear in latitude and longitude.
///
/// Progress outside `[0, 1]` (or NaN) is rejected rather than clamped.
/// The endpoints are reproduced exactly: `interpolate(r, 0.0) == r.pickup`
/// and `interpolate(r, 1.0) == r.dropoff`.
pub fn interpolate(route: &Route, progress: f64) -> GeofenceResult<GeoPoint> {
    if !(0.0..=1.0).contains(&progress) {
        return Err(GeofenceError::InvalidProgress(progress));
    }
    let rest = 1.0 - progress;
    Ok(GeoPoint {
        latitude: route.pickup.latitude * rest + route.dropoff.latitude * progress,
        longitude: route.pickup.longitude * rest + route.dropoff.longitude * progress,
    })
}
