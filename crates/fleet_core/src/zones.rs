//! Pluggable zone providers: the point-in-polygon capability behind the classifier.
//!
//! Two implementations, selectable via [`ZoneProviderKind`]:
//!
//! - **`CentroidZoneProvider`**: nearest US state reference point within a
//!   distance cutoff. Offline, deterministic, never fails.
//! - **`ArcGisZoneProvider`** (feature `arcgis`): spatial query against an
//!   ArcGIS feature layer of state boundaries.
//!
//! Providers are shared as `Arc<dyn ZoneProvider>`. They carry no cache or
//! timeout of their own; [`crate::classifier::ZoneClassifier`] adds both.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo::GeoPoint;

pub mod centroid;

#[cfg(feature = "arcgis")]
pub mod arcgis;

pub use centroid::{find_state, CentroidZoneProvider, StateCentroid, US_STATE_CENTROIDS};

/// Why a provider could not answer. The classifier treats every variant as
/// "zone unknown", never as "outside all zones".
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("zone provider unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("zone provider timed out")]
    Timeout,

    #[error("malformed zone provider response: {reason}")]
    Malformed { reason: String },
}

/// `Ok(Some(name))` for a polygon match, `Ok(None)` when the point lies
/// outside every tracked zone.
pub type ZoneLookup = Result<Option<String>, ProviderError>;

/// Point-in-polygon capability. Implementations must be `Send + Sync` so a
/// single provider can serve concurrent classifications.
pub trait ZoneProvider: Send + Sync {
    fn lookup(&self, point: GeoPoint) -> BoxFuture<'_, ZoneLookup>;

    /// Short label used in logs.
    fn name(&self) -> &'static str {
        "zone-provider"
    }
}

/// Default cutoff for the centroid provider, in planar degrees.
pub const DEFAULT_CENTROID_MAX_DISTANCE_DEG: f64 = 2.0;

fn default_centroid_max_distance() -> f64 {
    DEFAULT_CENTROID_MAX_DISTANCE_DEG
}

/// Which zone backend to use.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ZoneProviderKind {
    Centroid {
        #[serde(default = "default_centroid_max_distance")]
        max_distance_deg: f64,
    },
    /// ArcGIS feature layer URL, e.g.
    /// `https://sampleserver6.arcgisonline.com/arcgis/rest/services/USA/MapServer/2`.
    #[cfg(feature = "arcgis")]
    ArcGis { endpoint: String },
}

impl Default for ZoneProviderKind {
    fn default() -> Self {
        ZoneProviderKind::Centroid {
            max_distance_deg: DEFAULT_CENTROID_MAX_DISTANCE_DEG,
        }
    }
}

/// Construct a shared provider from its descriptor. `timeout` bounds each
/// network request of remote providers.
#[cfg_attr(not(feature = "arcgis"), allow(unused_variables))]
pub fn build_zone_provider(
    kind: &ZoneProviderKind,
    timeout: std::time::Duration,
) -> Result<Arc<dyn ZoneProvider>, ProviderError> {
    match kind {
        ZoneProviderKind::Centroid { max_distance_deg } => Ok(Arc::new(
            CentroidZoneProvider::us_states(*max_distance_deg),
        )),

        #[cfg(feature = "arcgis")]
        ZoneProviderKind::ArcGis { endpoint } => Ok(Arc::new(
            arcgis::ArcGisZoneProvider::new(endpoint, timeout)?,
        )),
    }
}
