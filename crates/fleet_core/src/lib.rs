pub mod agent;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod fleet;
pub mod geo;
pub mod ingest;
pub mod scheduler;
pub mod sink;
pub mod store;
pub mod trace;
pub mod zones;

#[cfg(feature = "test-helpers")]
pub mod test_helpers;

pub use engine::GeofenceEngine;
pub use error::{GeofenceError, GeofenceResult};
