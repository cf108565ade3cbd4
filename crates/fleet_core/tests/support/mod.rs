#![allow(dead_code)]

use std::sync::Arc;

use fleet_core::agent::leg_duration_secs;
use fleet_core::config::{AgentSpec, EngineConfig, MotionConfig};
use fleet_core::geo::{GeoPoint, Route};
use fleet_core::sink::EventSink;
use fleet_core::test_helpers::BoundaryZoneProvider;
use fleet_core::zones::ZoneProvider;
use fleet_core::GeofenceEngine;

/// Latitude used as the Rhode Island / Massachusetts line in tests.
pub const RI_MA_BORDER_LAT: f64 = 42.0;

pub fn point(lat: f64, lng: f64) -> GeoPoint {
    GeoPoint::new(lat, lng).expect("valid point")
}

/// Providence, RI to Boston, MA.
pub fn providence_to_boston() -> Route {
    Route::new(point(41.82, -71.41), point(42.36, -71.06))
}

/// Motion under which `route` takes exactly `ticks` one-second ticks.
pub fn motion_for_ticks(route: &Route, ticks: f64) -> MotionConfig {
    let defaults = MotionConfig::default();
    let nominal = leg_duration_secs(route, &defaults);
    MotionConfig {
        acceleration_factor: defaults.acceleration_factor * nominal / ticks,
        ..defaults
    }
}

pub fn ri_ma_provider() -> Arc<BoundaryZoneProvider> {
    Arc::new(BoundaryZoneProvider::new(
        RI_MA_BORDER_LAT,
        "Rhode Island",
        "Massachusetts",
    ))
}

/// Builder for engines with a small, explicit fleet.
pub struct TestEngineBuilder {
    config: EngineConfig,
    provider: Option<Arc<dyn ZoneProvider>>,
    sink: Option<Arc<dyn EventSink>>,
}

impl TestEngineBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            provider: None,
            sink: None,
        }
    }

    /// One agent on Providence → Boston, ten one-second ticks per leg.
    pub fn providence_taxi() -> Self {
        let route = providence_to_boston();
        Self::new()
            .with_agent("taxi_ri", vec![route])
            .with_motion(motion_for_ticks(&route, 10.0))
    }

    pub fn with_agent(mut self, id: &str, legs: Vec<Route>) -> Self {
        self.config.fleet.push(AgentSpec {
            id: id.to_string(),
            legs,
        });
        self
    }

    pub fn with_motion(mut self, motion: MotionConfig) -> Self {
        self.config.motion = motion;
        self
    }

    pub fn with_trace_capacity(mut self, capacity: usize) -> Self {
        self.config.trace_capacity = capacity;
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn ZoneProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn build(self) -> GeofenceEngine {
        let provider: Arc<dyn ZoneProvider> = match self.provider {
            Some(provider) => provider,
            None => ri_ma_provider(),
        };
        GeofenceEngine::with_parts(self.config, provider, self.sink).expect("engine")
    }
}
