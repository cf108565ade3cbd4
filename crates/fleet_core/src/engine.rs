//! The engine facade: what an API layer calls.
//!
//! Owns the shared store, trace, classifier and scheduler, and wires the
//! configured provider and sink into them. Each engine is an isolated
//! instance; nothing here is process-global.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use crate::agent::AgentState;
use crate::classifier::{ClassifierStats, ZoneClassifier};
use crate::config::{EngineConfig, SinkKind};
use crate::error::{GeofenceError, GeofenceResult};
use crate::geo::{GeoPoint, Route};
use crate::ingest::{IngestOutcome, LocationIngestor, LocationReport};
use crate::scheduler::{SimulationScheduler, StartOutcome, StopOutcome, TickReport};
use crate::sink::{build_sink, EventSink, SinkWriter};
use crate::store::{FleetSnapshot, FleetStateStore};
use crate::trace::{EventTrace, TransitionEvent};
use crate::zones::{build_zone_provider, find_state, StateCentroid, ZoneProvider, US_STATE_CENTROIDS};

/// Who is inside one zone right now.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneOccupancy {
    pub zone: String,
    /// Postal abbreviation when the zone is a known state.
    pub abbr: Option<&'static str>,
    pub center: Option<GeoPoint>,
    /// Simulated agents, in fleet order.
    pub agents: Vec<String>,
    /// Externally reported vehicles, by id.
    pub reported: Vec<String>,
    pub vehicle_count: usize,
}

pub struct GeofenceEngine {
    config: EngineConfig,
    store: Arc<FleetStateStore>,
    trace: Arc<EventTrace>,
    classifier: Arc<ZoneClassifier>,
    sink: Option<Arc<SinkWriter>>,
    scheduler: SimulationScheduler,
    ingestor: LocationIngestor,
}

impl GeofenceEngine {
    /// Build everything from configuration.
    ///
    /// A configured file sink needs a running Tokio runtime for its writer.
    pub fn build(config: EngineConfig) -> GeofenceResult<Self> {
        config.validate()?;
        let provider = build_zone_provider(&config.provider, config.classifier.timeout())
            .map_err(|e| GeofenceError::InvalidConfig {
                reason: format!("zone provider: {e}"),
            })?;
        let sink = match &config.sink {
            SinkKind::None => None,
            kind => Some(build_sink(kind)?),
        };
        Self::with_parts(config, provider, sink)
    }

    /// Use `provider` instead of the configured one.
    pub fn with_provider(config: EngineConfig, provider: Arc<dyn ZoneProvider>) -> GeofenceResult<Self> {
        let sink = match &config.sink {
            SinkKind::None => None,
            kind => Some(build_sink(kind)?),
        };
        Self::with_parts(config, provider, sink)
    }

    pub fn with_parts(
        config: EngineConfig,
        provider: Arc<dyn ZoneProvider>,
        sink: Option<Arc<dyn EventSink>>,
    ) -> GeofenceResult<Self> {
        config.validate()?;
        let provider_name = provider.name();
        let classifier = Arc::new(ZoneClassifier::new(provider, &config.classifier)?);
        let store = Arc::new(FleetStateStore::new());
        let trace = Arc::new(EventTrace::new(config.trace_capacity));
        let sink = match sink {
            Some(sink) => Some(Arc::new(SinkWriter::spawn(sink, config.sink_queue)?)),
            None => None,
        };

        let scheduler = SimulationScheduler::new(
            Arc::clone(&store),
            Arc::clone(&trace),
            Arc::clone(&classifier),
            sink.clone(),
            config.motion,
        );
        for spec in config.fleet_or_default() {
            scheduler.add_agent(&spec.id, spec.legs)?;
        }
        let ingestor = LocationIngestor::new(Arc::clone(&classifier), Arc::clone(&trace));

        info!(
            agents = store.len(),
            provider = provider_name,
            sink = sink.is_some(),
            "geofence engine ready"
        );
        Ok(Self {
            config,
            store,
            trace,
            classifier,
            sink,
            scheduler,
            ingestor,
        })
    }

    pub async fn start_simulation(&self) -> GeofenceResult<StartOutcome> {
        self.scheduler.start(self.config.tick_interval()).await
    }

    /// Start with `interval` instead of the configured tick interval.
    pub async fn start_simulation_every(&self, interval: Duration) -> GeofenceResult<StartOutcome> {
        self.scheduler.start(interval).await
    }

    pub async fn stop_simulation(&self) -> StopOutcome {
        self.scheduler.stop().await
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Stop if running and put the configured fleet back at its pickups.
    ///
    /// The trace is emptied. Reported vehicles and the classifier cache are
    /// left alone. Returns the number of agents after the reset.
    pub async fn reset_simulation(&self) -> GeofenceResult<usize> {
        self.scheduler.reset(self.config.fleet_or_default()).await
    }

    /// Advance the fleet by one tick outside the background loop.
    pub async fn tick(&self, elapsed: Duration) -> TickReport {
        self.scheduler.tick(elapsed).await
    }

    pub fn get_status(&self) -> FleetSnapshot {
        self.store.snapshot_all()
    }

    pub fn get_agent(&self, agent_id: &str) -> Option<AgentState> {
        self.store.get(agent_id)
    }

    pub fn search_by_zone(&self, zone: &str) -> Vec<String> {
        self.store.find_by_zone(zone)
    }

    pub fn recent_events(&self, n: usize) -> Vec<TransitionEvent> {
        self.trace.recent(n)
    }

    pub async fn ingest_location(&self, report: LocationReport) -> GeofenceResult<IngestOutcome> {
        let outcome = self.ingestor.ingest(report).await?;
        if let Some(sink) = &self.sink {
            for event in &outcome.events {
                sink.submit(event.clone());
            }
        }
        Ok(outcome)
    }

    /// Last zone seen for an externally reported vehicle.
    pub fn reported_zone(&self, vehicle_id: &str) -> Option<String> {
        self.ingestor.zone_of(vehicle_id)
    }

    /// Externally reported vehicles with at least one resolved read.
    pub fn reported_vehicles(&self) -> usize {
        self.ingestor.tracked()
    }

    /// The built-in zone catalog: every state reference point.
    pub fn list_zones(&self) -> &'static [StateCentroid] {
        US_STATE_CENTROIDS
    }

    /// A catalog zone by name or postal abbreviation, ignoring case.
    pub fn find_zone(&self, name_or_abbr: &str) -> Option<&'static StateCentroid> {
        find_state(name_or_abbr)
    }

    /// Occupied zones, by name, with the simulated and reported vehicles in each.
    pub fn zone_summary(&self) -> Vec<ZoneOccupancy> {
        let mut zones: BTreeMap<String, (Vec<String>, Vec<String>)> = BTreeMap::new();
        for agent in self.store.snapshot_all().agents {
            if let Some(zone) = agent.current_zone {
                zones.entry(zone).or_default().0.push(agent.id);
            }
        }
        for (vehicle_id, zone) in self.ingestor.located() {
            zones.entry(zone).or_default().1.push(vehicle_id);
        }

        zones
            .into_iter()
            .map(|(zone, (agents, reported))| {
                let known = find_state(&zone);
                ZoneOccupancy {
                    abbr: known.map(|s| s.abbr),
                    center: known.and_then(|s| GeoPoint::new(s.latitude, s.longitude).ok()),
                    vehicle_count: agents.len() + reported.len(),
                    zone,
                    agents,
                    reported,
                }
            })
            .collect()
    }

    pub fn add_agent(&self, id: &str, legs: Vec<Route>) -> GeofenceResult<()> {
        self.scheduler.add_agent(id, legs)
    }

    pub fn remove_agent(&self, agent_id: &str) -> GeofenceResult<AgentState> {
        self.store
            .remove(agent_id)
            .ok_or_else(|| GeofenceError::UnknownAgent {
                agent_id: agent_id.to_string(),
            })
    }

    pub fn classifier_stats(&self) -> ClassifierStats {
        self.classifier.stats()
    }

    pub fn sink(&self) -> Option<&SinkWriter> {
        self.sink.as_deref()
    }

    pub fn scheduler(&self) -> &SimulationScheduler {
        &self.scheduler
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
