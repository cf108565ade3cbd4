//! ArcGIS REST provider: point-intersects query against a state boundary layer.

use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{ProviderError, ZoneLookup, ZoneProvider};
use crate::geo::GeoPoint;

/// Queries `<endpoint>/query` with an `esriSpatialRelIntersects` point filter.
pub struct ArcGisZoneProvider {
    client: Client,
    endpoint: String,
}

impl ArcGisZoneProvider {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Unavailable {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    async fn query(&self, point: GeoPoint) -> ZoneLookup {
        let url = format!("{}/query", self.endpoint);
        let geometry = format!("{},{}", point.longitude(), point.latitude());

        let response = self
            .client
            .get(&url)
            .query(&[
                ("geometry", geometry.as_str()),
                ("geometryType", "esriGeometryPoint"),
                ("spatialRel", "esriSpatialRelIntersects"),
                ("outFields", "state_name,state_abbr"),
                ("f", "json"),
                ("inSR", "4326"),
            ])
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(transport_error)?;

        let body: QueryResponse = response.json().await.map_err(|e| ProviderError::Malformed {
            reason: e.to_string(),
        })?;

        // ArcGIS reports query failures in-band with HTTP 200.
        if let Some(error) = body.error {
            return Err(ProviderError::Unavailable {
                reason: format!("{} ({})", error.message, error.code),
            });
        }

        let zone = body
            .features
            .into_iter()
            .next()
            .and_then(|feature| feature.attributes.state_name.or(feature.attributes.state_abbr));
        debug!(provider = "arcgis", ?zone, "spatial query answered");
        Ok(zone)
    }
}

fn transport_error(error: reqwest::Error) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Unavailable {
            reason: error.to_string(),
        }
    }
}

impl ZoneProvider for ArcGisZoneProvider {
    fn lookup(&self, point: GeoPoint) -> BoxFuture<'_, ZoneLookup> {
        Box::pin(self.query(point))
    }

    fn name(&self) -> &'static str {
        "arcgis"
    }
}

/// Minimal ArcGIS query response structures.
#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    features: Vec<Feature>,
    error: Option<QueryError>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    attributes: Attributes,
}

#[derive(Debug, Default, Deserialize)]
struct Attributes {
    state_name: Option<String>,
    state_abbr: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}
