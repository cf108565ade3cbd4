//! Single-position ingestion for externally reported vehicles.
//!
//! Reports run through the same classifier and transition rules as the
//! simulation, against a zone tracker kept apart from the simulated fleet.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::agent::detect_transition;
use crate::classifier::ZoneClassifier;
use crate::error::GeofenceResult;
use crate::geo::GeoPoint;
use crate::trace::{EventSource, EventTrace, TransitionEvent};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationReport {
    pub vehicle_id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Defaults to the time of ingestion.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestOutcome {
    pub vehicle_id: String,
    /// Zone held after this report; the last known one if `degraded`.
    pub zone: Option<String>,
    pub previous_zone: Option<String>,
    pub degraded: bool,
    pub events: Vec<TransitionEvent>,
}

pub struct LocationIngestor {
    classifier: Arc<ZoneClassifier>,
    trace: Arc<EventTrace>,
    zones: Mutex<HashMap<String, Option<String>>>,
}

impl LocationIngestor {
    pub fn new(classifier: Arc<ZoneClassifier>, trace: Arc<EventTrace>) -> Self {
        Self {
            classifier,
            trace,
            zones: Mutex::new(HashMap::new()),
        }
    }

    /// Classify one report and record any zone change.
    ///
    /// Out-of-range coordinates are rejected before the classifier is called.
    pub async fn ingest(&self, report: LocationReport) -> GeofenceResult<IngestOutcome> {
        let position = GeoPoint::new(report.latitude, report.longitude)?;
        let at = report.timestamp.unwrap_or_else(Utc::now);
        let result = self.classifier.classify(position).await;

        // Re-read under the lock: another report for this vehicle may have
        // landed while the classification was in flight. The trace append
        // stays inside the lock so events for one vehicle keep report order.
        let (previous_zone, events) = {
            let mut zones = self.zones.lock();
            let known = zones.get(&report.vehicle_id).cloned().flatten();
            let events = match detect_transition(known.as_deref(), &result) {
                Some(t) => t.into_events(&report.vehicle_id, position, at, EventSource::Ingest),
                None => Vec::new(),
            };
            if !result.degraded {
                zones.insert(report.vehicle_id.clone(), result.zone.clone());
            }
            if !events.is_empty() {
                self.trace.append_all(events.iter().cloned());
            }
            (known, events)
        };
        for event in &events {
            info!(
                vehicle_id = %event.agent_id,
                kind = ?event.kind,
                zone = %event.zone,
                "reported vehicle zone transition"
            );
        }

        let zone = if result.degraded {
            previous_zone.clone()
        } else {
            result.zone
        };
        Ok(IngestOutcome {
            vehicle_id: report.vehicle_id,
            zone,
            previous_zone,
            degraded: result.degraded,
            events,
        })
    }

    /// Last known zone of a reported vehicle.
    pub fn zone_of(&self, vehicle_id: &str) -> Option<String> {
        self.zones.lock().get(vehicle_id).cloned().flatten()
    }

    /// `(vehicle_id, zone)` for every reported vehicle inside a zone, by id.
    pub fn located(&self) -> Vec<(String, String)> {
        let zones = self.zones.lock();
        let mut located: Vec<(String, String)> = zones
            .iter()
            .filter_map(|(id, zone)| Some((id.clone(), zone.clone()?)))
            .collect();
        located.sort();
        located
    }

    /// Vehicles with at least one resolved report, zone or not.
    pub fn tracked(&self) -> usize {
        self.zones.lock().len()
    }
}
