//! Error taxonomy for the geofencing engine.
//!
//! Validation failures (coordinates, progress, configuration) are hard errors
//! returned to the caller. Zone provider failures never surface here: the
//! classifier turns them into degraded results instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GeofenceError {
    #[error("latitude {0} is outside [-90, 90]")]
    InvalidLatitude(f64),

    #[error("longitude {0} is outside [-180, 180]")]
    InvalidLongitude(f64),

    /// Progress must be clamped or wrapped by the caller before interpolation.
    #[error("route progress {0} is outside [0, 1]")]
    InvalidProgress(f64),

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("failed to read configuration from '{path}': {source}")]
    ConfigIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("agent '{agent_id}' has no route legs")]
    EmptyItinerary { agent_id: String },

    #[error("agent '{agent_id}' is already registered")]
    DuplicateAgent { agent_id: String },

    #[error("unknown agent '{agent_id}'")]
    UnknownAgent { agent_id: String },

    #[error("event sink unavailable: {reason}")]
    SinkUnavailable { reason: String },

    /// Background tasks (scheduler, sink writer) need a Tokio runtime.
    #[error("no Tokio runtime available: {reason}")]
    RuntimeUnavailable { reason: String },
}

pub type GeofenceResult<T> = Result<T, GeofenceError>;
