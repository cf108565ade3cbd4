//! Deterministic fakes for tests: scripted and threshold zone providers and
//! an in-memory event sink.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;

use crate::geo::GeoPoint;
use crate::sink::EventSink;
use crate::trace::TransitionEvent;
use crate::zones::{ProviderError, ZoneLookup, ZoneProvider};

/// Answers lookups from a queue, then repeats a fallback answer.
pub struct ScriptedZoneProvider {
    script: Mutex<VecDeque<ZoneLookup>>,
    fallback: ZoneLookup,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedZoneProvider {
    pub fn new(script: impl IntoIterator<Item = ZoneLookup>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback: Ok(None),
            delay: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Always answers `zone`.
    pub fn constant(zone: Option<&str>) -> Self {
        Self::new(Vec::new()).with_fallback(Ok(zone.map(str::to_string)))
    }

    /// Always fails.
    pub fn failing() -> Self {
        Self::new(Vec::new()).with_fallback(Err(ProviderError::Unavailable {
            reason: "scripted failure".to_string(),
        }))
    }

    pub fn with_fallback(mut self, fallback: ZoneLookup) -> Self {
        self.fallback = fallback;
        self
    }

    /// Sleep this long (Tokio time) before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push(&self, answer: ZoneLookup) {
        self.script.lock().push_back(answer);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of lookups observed running at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Lookups running now. Cancelled lookups are not counted.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

/// Holds one slot of `in_flight` until dropped, so a lookup cancelled by a
/// timeout releases it too.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ZoneProvider for ScriptedZoneProvider {
    fn lookup(&self, _point: GeoPoint) -> BoxFuture<'_, ZoneLookup> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let _slot = InFlight::enter(&self.in_flight, &self.peak_in_flight);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.script
                .lock()
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone())
        })
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Splits the world at a latitude: `south` below it, `north` at or above.
pub struct BoundaryZoneProvider {
    latitude: f64,
    south: String,
    north: String,
    failing: AtomicBool,
    fail_west_of: Option<f64>,
    calls: AtomicUsize,
}

impl BoundaryZoneProvider {
    pub fn new(latitude: f64, south: &str, north: &str) -> Self {
        Self {
            latitude,
            south: south.to_string(),
            north: north.to_string(),
            failing: AtomicBool::new(false),
            fail_west_of: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Fail every lookup strictly west of `longitude`.
    pub fn with_failures_west_of(mut self, longitude: f64) -> Self {
        self.fail_west_of = Some(longitude);
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ZoneProvider for BoundaryZoneProvider {
    fn lookup(&self, point: GeoPoint) -> BoxFuture<'_, ZoneLookup> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let west_outage = self.fail_west_of.is_some_and(|lng| point.longitude() < lng);
        let answer = if west_outage || self.failing.load(Ordering::SeqCst) {
            Err(ProviderError::Unavailable {
                reason: "boundary provider switched off".to_string(),
            })
        } else if point.latitude() < self.latitude {
            Ok(Some(self.south.clone()))
        } else {
            Ok(Some(self.north.clone()))
        };
        Box::pin(futures::future::ready(answer))
    }

    fn name(&self) -> &'static str {
        "boundary"
    }
}

/// Collects events in memory; can be told to fail.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<TransitionEvent>>,
    failing: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<TransitionEvent> {
        self.events.lock().clone()
    }
}

impl EventSink for MemorySink {
    fn write_event(&self, event: &TransitionEvent) -> Result<(), String> {
        if self.failing.load(Ordering::SeqCst) {
            return Err("memory sink set to fail".to_string());
        }
        self.events.lock().push(event.clone());
        Ok(())
    }
}
