//! Zone classification: a caching, rate-limited front for a [`ZoneProvider`].
//!
//! Each lookup is bucketed into a coordinate cell. A fresh cached answer for
//! the cell is returned without touching the provider. On a miss the provider
//! is called under a semaphore (capping in-flight calls) and a timeout.
//!
//! Outcomes:
//!
//! - provider match → `zone: Some(name)`, cached for the TTL
//! - provider "no match" → `zone: None, degraded: false`, cached for the TTL
//! - provider failure or timeout → `zone: None, degraded: true`, not cached
//!
//! Expired entries are evicted lazily when read; nothing sweeps the cache.
//! Two concurrent misses on the same cell may both reach the provider; the
//! last answer wins.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use h3o::Resolution;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::debug;

use crate::config::{ClassifierConfig, QuantizerKind};
use crate::error::{GeofenceError, GeofenceResult};
use crate::geo::GeoPoint;
use crate::zones::ZoneProvider;

/// Result of one classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZoneResult {
    pub zone: Option<String>,
    /// The provider could not answer; `zone` carries no information.
    pub degraded: bool,
    /// Served from the cache without a provider call.
    pub cached: bool,
}

impl ZoneResult {
    pub fn resolved(zone: Option<String>) -> Self {
        Self {
            zone,
            degraded: false,
            cached: false,
        }
    }

    pub fn degraded() -> Self {
        Self {
            zone: None,
            degraded: true,
            cached: false,
        }
    }

    fn from_cache(zone: Option<String>) -> Self {
        Self {
            zone,
            degraded: false,
            cached: true,
        }
    }
}

/// Quantized coordinate cell used as the cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellKey {
    Decimal { lat: i64, lng: i64 },
    H3(u64),
}

#[derive(Debug, Clone, Copy)]
enum Quantizer {
    Decimal { scale: f64 },
    H3(Resolution),
}

impl Quantizer {
    fn from_config(config: &ClassifierConfig) -> GeofenceResult<Self> {
        match config.quantizer {
            QuantizerKind::Decimal => Ok(Quantizer::Decimal {
                scale: 10f64.powi(config.precision_decimals as i32),
            }),
            QuantizerKind::H3 { resolution } => Resolution::try_from(resolution)
                .map(Quantizer::H3)
                .map_err(|e| GeofenceError::InvalidConfig {
                    reason: format!("invalid H3 resolution {resolution}: {e}"),
                }),
        }
    }

    fn cell_key(&self, point: GeoPoint) -> CellKey {
        match self {
            Quantizer::Decimal { scale } => CellKey::Decimal {
                lat: (point.latitude() * scale).round() as i64,
                lng: (point.longitude() * scale).round() as i64,
            },
            Quantizer::H3(resolution) => match h3o::LatLng::new(point.latitude(), point.longitude()) {
                Ok(ll) => CellKey::H3(u64::from(ll.to_cell(*resolution))),
                // GeoPoint is range-checked, so this only guards against h3o's own rules.
                Err(_) => CellKey::Decimal {
                    lat: (point.latitude() * 1e6).round() as i64,
                    lng: (point.longitude() * 1e6).round() as i64,
                },
            },
        }
    }
}

struct CacheEntry {
    zone: Option<String>,
    expires_at: Instant,
}

/// Counters for dashboards and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClassifierStats {
    pub lookups: u64,
    pub cache_hits: u64,
    pub provider_calls: u64,
    pub degraded: u64,
}

#[derive(Default)]
struct Counters {
    lookups: AtomicU64,
    cache_hits: AtomicU64,
    provider_calls: AtomicU64,
    degraded: AtomicU64,
}

pub struct ZoneClassifier {
    provider: Arc<dyn ZoneProvider>,
    quantizer: Quantizer,
    ttl: Duration,
    timeout: Duration,
    cache: Mutex<LruCache<CellKey, CacheEntry>>,
    permits: Semaphore,
    counters: Counters,
}

impl ZoneClassifier {
    pub fn new(provider: Arc<dyn ZoneProvider>, config: &ClassifierConfig) -> GeofenceResult<Self> {
        let quantizer = Quantizer::from_config(config)?;
        let capacity = NonZeroUsize::new(config.cache_capacity).ok_or_else(|| {
            GeofenceError::InvalidConfig {
                reason: "classifier.cache_capacity must be > 0".to_string(),
            }
        })?;
        Ok(Self {
            provider,
            quantizer,
            ttl: config.ttl(),
            timeout: config.timeout(),
            cache: Mutex::new(LruCache::new(capacity)),
            permits: Semaphore::new(config.max_in_flight.max(1)),
            counters: Counters::default(),
        })
    }

    pub fn cell_key(&self, point: GeoPoint) -> CellKey {
        self.quantizer.cell_key(point)
    }

    pub async fn classify(&self, point: GeoPoint) -> ZoneResult {
        self.counters.lookups.fetch_add(1, Ordering::Relaxed);
        let key = self.cell_key(point);

        if let Some(zone) = self.cached(&key) {
            return ZoneResult::from_cache(zone);
        }

        let Ok(_permit) = self.permits.acquire().await else {
            self.counters.degraded.fetch_add(1, Ordering::Relaxed);
            return ZoneResult::degraded();
        };

        // Another call may have filled the cell while this one waited.
        if let Some(zone) = self.cached(&key) {
            return ZoneResult::from_cache(zone);
        }

        self.counters.provider_calls.fetch_add(1, Ordering::Relaxed);
        match tokio::time::timeout(self.timeout, self.provider.lookup(point)).await {
            Ok(Ok(zone)) => {
                self.store(key, zone.clone());
                ZoneResult::resolved(zone)
            }
            Ok(Err(error)) => {
                self.counters.degraded.fetch_add(1, Ordering::Relaxed);
                debug!(provider = self.provider.name(), %error, "zone lookup failed");
                ZoneResult::degraded()
            }
            Err(_) => {
                self.counters.degraded.fetch_add(1, Ordering::Relaxed);
                debug!(
                    provider = self.provider.name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "zone lookup timed out"
                );
                ZoneResult::degraded()
            }
        }
    }

    fn cached(&self, key: &CellKey) -> Option<Option<String>> {
        let mut cache = self.cache.lock();
        let fresh = match cache.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.zone.clone()),
            Some(_) => None,
            None => return None,
        };
        match fresh {
            Some(zone) => {
                self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
                Some(zone)
            }
            None => {
                cache.pop(key);
                None
            }
        }
    }

    fn store(&self, key: CellKey, zone: Option<String>) {
        let entry = CacheEntry {
            zone,
            expires_at: Instant::now() + self.ttl,
        };
        self.cache.lock().put(key, entry);
    }

    /// Number of cells currently cached, expired or not.
    pub fn cached_cells(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn stats(&self) -> ClassifierStats {
        ClassifierStats {
            lookups: self.counters.lookups.load(Ordering::Relaxed),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            provider_calls: self.counters.provider_calls.load(Ordering::Relaxed),
            degraded: self.counters.degraded.load(Ordering::Relaxed),
        }
    }
}
