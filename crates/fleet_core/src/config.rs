//! Engine configuration.
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration that runs the built-in five-taxi fleet against the offline
//! centroid provider.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GeofenceError, GeofenceResult};
use crate::fleet;
use crate::geo::Route;
use crate::zones::ZoneProviderKind;

/// Default scheduler period (ms).
const DEFAULT_TICK_INTERVAL_MS: u64 = 2_000;

/// Default capacity of the in-memory event trace.
const DEFAULT_TRACE_CAPACITY: usize = 500;

/// Default bound of the write-behind sink queue.
const DEFAULT_SINK_QUEUE: usize = 256;

/// Highest supported decimal quantization (about 0.1 m).
const MAX_PRECISION_DECIMALS: u32 = 6;

/// Highest H3 resolution.
const MAX_H3_RESOLUTION: u8 = 15;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tick_interval_ms: u64,
    pub motion: MotionConfig,
    pub classifier: ClassifierConfig,
    pub trace_capacity: usize,
    pub provider: ZoneProviderKind,
    pub sink: SinkKind,
    pub sink_queue: usize,
    /// Empty means [`fleet::us_taxi_fleet`].
    pub fleet: Vec<AgentSpec>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            motion: MotionConfig::default(),
            classifier: ClassifierConfig::default(),
            trace_capacity: DEFAULT_TRACE_CAPACITY,
            provider: ZoneProviderKind::default(),
            sink: SinkKind::default(),
            sink_queue: DEFAULT_SINK_QUEUE,
            fleet: Vec::new(),
        }
    }
}

/// How fast agents move along their legs.
///
/// A leg takes `distance_km / cruising_speed_kmh` hours of simulated driving,
/// divided by `acceleration_factor` to compress it into wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    pub cruising_speed_kmh: f64,
    pub acceleration_factor: f64,
    /// Per-leg speed variation: each agent draws a factor uniformly from
    /// `[1 - jitter, 1 + jitter]` when it starts a leg.
    pub speed_jitter: f64,
    /// Seed for RNG (for reproducibility).
    pub seed: u64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            cruising_speed_kmh: 90.0,
            acceleration_factor: 10.0,
            speed_jitter: 0.0,
            seed: 0,
        }
    }
}

/// How coordinates are bucketed into cache cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuantizerKind {
    /// Round latitude and longitude to `precision_decimals` places.
    #[default]
    Decimal,
    /// Bucket by H3 cell at the given resolution.
    H3 { resolution: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub precision_decimals: u32,
    pub quantizer: QuantizerKind,
    pub ttl_secs: u64,
    pub timeout_ms: u64,
    /// Upper bound on concurrent provider calls.
    pub max_in_flight: usize,
    pub cache_capacity: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            precision_decimals: 3,
            quantizer: QuantizerKind::Decimal,
            ttl_secs: 300,
            timeout_ms: 5_000,
            max_in_flight: 4,
            cache_capacity: 10_000,
        }
    }
}

impl ClassifierConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Where transition events are persisted, best effort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinkKind {
    #[default]
    None,
    JsonLines { path: PathBuf },
}

/// One agent and the legs it cycles through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub id: String,
    pub legs: Vec<Route>,
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> GeofenceResult<Self> {
        let config: EngineConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> GeofenceResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| GeofenceError::ConfigIo {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// The configured fleet, or the built-in one when none is configured.
    pub fn fleet_or_default(&self) -> Vec<AgentSpec> {
        if self.fleet.is_empty() {
            fleet::us_taxi_fleet()
        } else {
            self.fleet.clone()
        }
    }

    pub fn validate(&self) -> GeofenceResult<()> {
        if self.tick_interval_ms == 0 {
            return Err(invalid("tick_interval_ms must be > 0"));
        }
        let motion = &self.motion;
        if !(motion.cruising_speed_kmh > 0.0 && motion.cruising_speed_kmh.is_finite()) {
            return Err(invalid("motion.cruising_speed_kmh must be a positive number"));
        }
        if !(motion.acceleration_factor > 0.0 && motion.acceleration_factor.is_finite()) {
            return Err(invalid("motion.acceleration_factor must be a positive number"));
        }
        if !(0.0..1.0).contains(&motion.speed_jitter) {
            return Err(invalid("motion.speed_jitter must be in [0, 1)"));
        }

        let classifier = &self.classifier;
        if classifier.precision_decimals > MAX_PRECISION_DECIMALS {
            return Err(invalid(&format!(
                "classifier.precision_decimals must be <= {MAX_PRECISION_DECIMALS}"
            )));
        }
        if let QuantizerKind::H3 { resolution } = classifier.quantizer {
            if resolution > MAX_H3_RESOLUTION {
                return Err(invalid(&format!(
                    "classifier.quantizer.resolution must be <= {MAX_H3_RESOLUTION}"
                )));
            }
        }
        if classifier.timeout_ms == 0 {
            return Err(invalid("classifier.timeout_ms must be > 0"));
        }
        if classifier.max_in_flight == 0 {
            return Err(invalid("classifier.max_in_flight must be > 0"));
        }
        if classifier.cache_capacity == 0 {
            return Err(invalid("classifier.cache_capacity must be > 0"));
        }
        if self.trace_capacity == 0 {
            return Err(invalid("trace_capacity must be > 0"));
        }
        if self.sink_queue == 0 {
            return Err(invalid("sink_queue must be > 0"));
        }

        let mut seen = std::collections::HashSet::new();
        for agent in &self.fleet {
            if agent.legs.is_empty() {
                return Err(GeofenceError::EmptyItinerary {
                    agent_id: agent.id.clone(),
                });
            }
            if !seen.insert(agent.id.as_str()) {
                return Err(GeofenceError::DuplicateAgent {
                    agent_id: agent.id.clone(),
                });
            }
        }
        Ok(())
    }
}

fn invalid(reason: &str) -> GeofenceError {
    GeofenceError::InvalidConfig {
        reason: reason.to_string(),
    }
}
