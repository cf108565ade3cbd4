//! Offline zone provider: nearest state reference point.
//!
//! A coarse stand-in for real boundary polygons. A point belongs to the state
//! whose reference point is closest in planar degrees, provided it lies within
//! the cutoff; otherwise it is outside every zone.

use futures::future::{self, BoxFuture};
use serde::Serialize;

use super::{ZoneLookup, ZoneProvider};
use crate::geo::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StateCentroid {
    pub name: &'static str,
    pub abbr: &'static str,
    pub latitude: f64,
    pub longitude: f64,
}

const fn state(name: &'static str, abbr: &'static str, latitude: f64, longitude: f64) -> StateCentroid {
    StateCentroid {
        name,
        abbr,
        latitude,
        longitude,
    }
}

/// Geographic reference points of the 50 states and DC.
pub const US_STATE_CENTROIDS: &[StateCentroid] = &[
    state("Alabama", "AL", 32.318231, -86.902298),
    state("Alaska", "AK", 63.588753, -154.493062),
    state("Arizona", "AZ", 34.048928, -111.093731),
    state("Arkansas", "AR", 35.20105, -91.831833),
    state("California", "CA", 36.778261, -119.417932),
    state("Colorado", "CO", 39.550051, -105.782067),
    state("Connecticut", "CT", 41.603221, -73.087749),
    state("Delaware", "DE", 38.910832, -75.52767),
    state("Florida", "FL", 27.664827, -81.515754),
    state("Georgia", "GA", 32.157435, -82.907123),
    state("Hawaii", "HI", 19.898682, -155.665857),
    state("Idaho", "ID", 44.068202, -114.742041),
    state("Illinois", "IL", 40.633125, -89.398528),
    state("Indiana", "IN", 40.551217, -85.602364),
    state("Iowa", "IA", 41.878003, -93.097702),
    state("Kansas", "KS", 39.011902, -98.484246),
    state("Kentucky", "KY", 37.839333, -84.270018),
    state("Louisiana", "LA", 30.984298, -91.962333),
    state("Maine", "ME", 45.253783, -69.445469),
    state("Maryland", "MD", 39.045755, -76.641271),
    state("Massachusetts", "MA", 42.407211, -71.382437),
    state("Michigan", "MI", 44.314844, -85.602364),
    state("Minnesota", "MN", 46.729553, -94.6859),
    state("Mississippi", "MS", 32.354668, -89.398528),
    state("Missouri", "MO", 37.964253, -91.831833),
    state("Montana", "MT", 46.879682, -110.362566),
    state("Nebraska", "NE", 41.492537, -99.901813),
    state("Nevada", "NV", 38.80261, -116.419389),
    state("New Hampshire", "NH", 43.193852, -71.572395),
    state("New Jersey", "NJ", 40.058324, -74.405661),
    state("New Mexico", "NM", 34.97273, -105.032363),
    state("New York", "NY", 43.299428, -74.217933),
    state("North Carolina", "NC", 35.759573, -79.0193),
    state("North Dakota", "ND", 47.551493, -101.002012),
    state("Ohio", "OH", 40.417287, -82.907123),
    state("Oklahoma", "OK", 35.007752, -97.092877),
    state("Oregon", "OR", 43.804133, -120.554201),
    state("Pennsylvania", "PA", 41.203322, -77.194525),
    state("Rhode Island", "RI", 41.580095, -71.477429),
    state("South Carolina", "SC", 33.836081, -81.163725),
    state("South Dakota", "SD", 43.969515, -99.901813),
    state("Tennessee", "TN", 35.517491, -86.580447),
    state("Texas", "TX", 31.968599, -99.901813),
    state("Utah", "UT", 39.32098, -111.093731),
    state("Vermont", "VT", 44.558803, -72.577841),
    state("Virginia", "VA", 37.431573, -78.656894),
    state("Washington", "WA", 47.751074, -120.740139),
    state("West Virginia", "WV", 38.597626, -80.454903),
    state("Wisconsin", "WI", 43.78444, -88.787868),
    state("Wyoming", "WY", 43.075968, -107.290284),
    state("District of Columbia", "DC", 38.907192, -77.036871),
];

/// Look up a state by display name or postal abbreviation, ignoring case.
pub fn find_state(name_or_abbr: &str) -> Option<&'static StateCentroid> {
    US_STATE_CENTROIDS.iter().find(|s| {
        s.name.eq_ignore_ascii_case(name_or_abbr) || s.abbr.eq_ignore_ascii_case(name_or_abbr)
    })
}

#[derive(Debug, Clone)]
pub struct CentroidZoneProvider {
    centroids: Vec<StateCentroid>,
    max_distance_deg: f64,
}

impl CentroidZoneProvider {
    pub fn new(centroids: Vec<StateCentroid>, max_distance_deg: f64) -> Self {
        Self {
            centroids,
            max_distance_deg,
        }
    }

    pub fn us_states(max_distance_deg: f64) -> Self {
        Self::new(US_STATE_CENTROIDS.to_vec(), max_distance_deg)
    }

    /// Synchronous core of [`ZoneProvider::lookup`].
    pub fn nearest(&self, point: GeoPoint) -> Option<&'static str> {
        let mut best: Option<(&'static str, f64)> = None;
        for centroid in &self.centroids {
            let dlat = point.latitude() - centroid.latitude;
            let dlng = point.longitude() - centroid.longitude;
            let distance = (dlat * dlat + dlng * dlng).sqrt();
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((centroid.name, distance));
            }
        }
        best.filter(|(_, d)| *d < self.max_distance_deg)
            .map(|(name, _)| name)
    }
}

impl ZoneProvider for CentroidZoneProvider {
    fn lookup(&self, point: GeoPoint) -> BoxFuture<'_, ZoneLookup> {
        let zone = self.nearest(point).map(str::to_string);
        Box::pin(future::ready(Ok(zone)))
    }

    fn name(&self) -> &'static str {
        "centroid"
    }
}
