//! Per-agent state: progress along the current leg, trip phase, and zone
//! transition detection.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::classifier::ZoneResult;
use crate::config::MotionConfig;
use crate::error::{GeofenceError, GeofenceResult};
use crate::geo::{interpolate, GeoPoint, Route};
use crate::trace::{EventSource, TransitionEvent, TransitionKind};

/// Progress within this distance of 1.0 counts as arrived.
pub const PROGRESS_EPSILON: f64 = 1e-9;

/// Trip phase, derived from progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TripStatus {
    Pickup,
    Enroute,
    Dropoff,
}

impl TripStatus {
    pub fn from_progress(progress: f64) -> Self {
        if progress <= 0.0 {
            TripStatus::Pickup
        } else if progress >= 1.0 {
            TripStatus::Dropoff
        } else {
            TripStatus::Enroute
        }
    }
}

/// Seconds a leg takes at full speed factor.
///
/// Zero for a degenerate leg whose pickup and dropoff coincide.
pub fn leg_duration_secs(route: &Route, motion: &MotionConfig) -> f64 {
    let hours = route.distance_km() / motion.cruising_speed_kmh;
    hours * 3600.0 / motion.acceleration_factor
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentState {
    pub id: String,
    pub itinerary: Vec<Route>,
    pub leg_index: usize,
    pub route: Route,
    pub progress: f64,
    pub position: GeoPoint,
    pub current_zone: Option<String>,
    /// Zone held before the most recent change of `current_zone`.
    pub previous_zone: Option<String>,
    pub status: TripStatus,
    /// Multiplier on the nominal speed for the current leg.
    pub speed_factor: f64,
    pub last_classified_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl AgentState {
    /// A new agent parked at the pickup of its first leg, zone unknown.
    pub fn new(id: impl Into<String>, itinerary: Vec<Route>, speed_factor: f64) -> GeofenceResult<Self> {
        let id = id.into();
        let Some(route) = itinerary.first().copied() else {
            return Err(GeofenceError::EmptyItinerary { agent_id: id });
        };
        Ok(Self {
            id,
            itinerary,
            leg_index: 0,
            route,
            progress: 0.0,
            position: route.pickup,
            current_zone: None,
            previous_zone: None,
            status: TripStatus::Pickup,
            speed_factor,
            last_classified_at: None,
            updated_at: Utc::now(),
        })
    }

    /// Move the agent forward by `elapsed_secs` of wall-clock time.
    ///
    /// An agent sitting at its dropoff starts the next leg at progress 0
    /// instead of moving; `next_speed` supplies the factor for that leg.
    /// Returns `true` when the leg changed.
    pub fn advance(
        &mut self,
        elapsed_secs: f64,
        motion: &MotionConfig,
        next_speed: impl FnOnce() -> f64,
    ) -> GeofenceResult<bool> {
        if self.status == TripStatus::Dropoff {
            self.leg_index = (self.leg_index + 1) % self.itinerary.len();
            self.route = self.itinerary[self.leg_index];
            self.speed_factor = next_speed();
            self.set_progress(0.0)?;
            return Ok(true);
        }

        let duration = leg_duration_secs(&self.route, motion);
        let progress = if duration <= 0.0 {
            1.0
        } else {
            let step = self.speed_factor * elapsed_secs.max(0.0) / duration;
            let next = (self.progress + step).clamp(0.0, 1.0);
            if next >= 1.0 - PROGRESS_EPSILON {
                1.0
            } else {
                next
            }
        };
        self.set_progress(progress)?;
        Ok(false)
    }

    /// Place the agent at `progress` on its current leg.
    pub fn set_progress(&mut self, progress: f64) -> GeofenceResult<()> {
        self.position = interpolate(&self.route, progress)?;
        self.progress = progress;
        self.status = TripStatus::from_progress(progress);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Fold a classification into the agent. Degraded results leave the zone
    /// untouched.
    pub fn apply_classification(
        &mut self,
        result: &ZoneResult,
        at: DateTime<Utc>,
    ) -> Option<ZoneTransition> {
        if result.degraded {
            return None;
        }
        self.last_classified_at = Some(at);
        let transition = detect_transition(self.current_zone.as_deref(), result)?;
        self.previous_zone = self.current_zone.take();
        self.current_zone = transition.entered.clone();
        Some(transition)
    }
}

/// A zone change: the zone left (if any) and the zone entered (if any).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneTransition {
    pub exited: Option<String>,
    pub entered: Option<String>,
}

impl ZoneTransition {
    /// Exit first, then enter.
    pub fn into_events(
        self,
        agent_id: &str,
        position: GeoPoint,
        at: DateTime<Utc>,
        source: EventSource,
    ) -> Vec<TransitionEvent> {
        let mut events = Vec::with_capacity(2);
        if let Some(zone) = &self.exited {
            events.push(TransitionEvent {
                agent_id: agent_id.to_string(),
                kind: TransitionKind::Exit,
                zone: zone.clone(),
                from_zone: self.exited.clone(),
                to_zone: self.entered.clone(),
                position,
                occurred_at: at,
                source,
            });
        }
        if let Some(zone) = &self.entered {
            events.push(TransitionEvent {
                agent_id: agent_id.to_string(),
                kind: TransitionKind::Enter,
                zone: zone.clone(),
                from_zone: self.exited.clone(),
                to_zone: self.entered.clone(),
                position,
                occurred_at: at,
                source,
            });
        }
        events
    }
}

/// Compare the held zone against a fresh classification.
///
/// Returns `None` for degraded results and for unchanged zones.
pub fn detect_transition(current: Option<&str>, result: &ZoneResult) -> Option<ZoneTransition> {
    if result.degraded || current == result.zone.as_deref() {
        return None;
    }
    Some(ZoneTransition {
        exited: current.map(str::to_string),
        entered: result.zone.clone(),
    })
}

/// Draws per-leg speed factors from a seeded RNG.
pub struct SpeedSampler {
    jitter: f64,
    seed: u64,
    rng: Mutex<StdRng>,
}

impl SpeedSampler {
    pub fn new(motion: &MotionConfig) -> Self {
        Self {
            jitter: motion.speed_jitter,
            seed: motion.seed,
            rng: Mutex::new(StdRng::seed_from_u64(motion.seed)),
        }
    }

    /// Restart the sequence from the configured seed.
    pub fn reseed(&self) {
        *self.rng.lock() = StdRng::seed_from_u64(self.seed);
    }

    pub fn sample(&self) -> f64 {
        if self.jitter <= 0.0 {
            return 1.0;
        }
        self.rng
            .lock()
            .gen_range((1.0 - self.jitter)..=(1.0 + self.jitter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(lat: f64, lng: f64) -> GeoPoint {
        GeoPoint::new(lat, lng).expect("valid point")
    }

    fn providence_to_boston() -> Route {
        Route::new(point(41.82, -71.41), point(42.36, -71.06))
    }

    fn resolved(zone: Option<&str>) -> ZoneResult {
        ZoneResult::resolved(zone.map(str::to_string))
    }

    /// Motion under which one leg of `route` takes `ticks` seconds.
    fn motion_for(route: &Route, ticks: f64) -> MotionConfig {
        let nominal = leg_duration_secs(route, &MotionConfig::default());
        MotionConfig {
            acceleration_factor: MotionConfig::default().acceleration_factor * nominal / ticks,
            ..MotionConfig::default()
        }
    }

    #[test]
    fn status_follows_progress_thresholds() {
        assert_eq!(TripStatus::from_progress(0.0), TripStatus::Pickup);
        assert_eq!(TripStatus::from_progress(0.3), TripStatus::Enroute);
        assert_eq!(TripStatus::from_progress(1.0), TripStatus::Dropoff);
    }

    #[test]
    fn empty_itinerary_is_rejected() {
        assert!(matches!(
            AgentState::new("taxi", vec![], 1.0),
            Err(GeofenceError::EmptyItinerary { .. })
        ));
    }

    #[test]
    fn advances_then_restarts_leg() {
        let route = providence_to_boston();
        let motion = motion_for(&route, 4.0);
        let mut agent = AgentState::new("taxi", vec![route], 1.0).expect("agent");
        assert_eq!(agent.position, route.pickup);

        let mut seen = Vec::new();
        for _ in 0..6 {
            agent.advance(1.0, &motion, || 1.0).expect("advance");
            seen.push((agent.progress, agent.status));
        }
        assert!((seen[0].0 - 0.25).abs() < 1e-9);
        assert_eq!(seen[0].1, TripStatus::Enroute);
        assert_eq!(seen[3], (1.0, TripStatus::Dropoff));
        assert_eq!(seen[4], (0.0, TripStatus::Pickup));
        assert!((seen[5].0 - 0.25).abs() < 1e-9);
        assert_eq!(agent.leg_index, 0);
    }

    #[test]
    fn dropoff_moves_to_next_leg_and_wraps() {
        let first = providence_to_boston();
        let second = Route::new(first.dropoff, first.pickup);
        let motion = motion_for(&first, 1.0);
        let mut agent = AgentState::new("taxi", vec![first, second], 1.0).expect("agent");

        agent.advance(1.0, &motion, || 1.0).expect("arrive");
        assert_eq!(agent.position, first.dropoff);
        assert!(agent.advance(1.0, &motion, || 0.5).expect("next leg"));
        assert_eq!(agent.leg_index, 1);
        assert_eq!(agent.route, second);
        assert_eq!(agent.speed_factor, 0.5);
        assert_eq!(agent.position, second.pickup);

        agent.advance(10.0, &motion, || 1.0).expect("arrive");
        assert!(agent.advance(1.0, &motion, || 1.0).expect("wrap"));
        assert_eq!(agent.leg_index, 0);
    }

    #[test]
    fn zero_length_leg_completes_immediately() {
        let here = point(31.97, -99.9);
        let mut agent =
            AgentState::new("taxi", vec![Route::new(here, here)], 1.0).expect("agent");
        agent
            .advance(0.1, &MotionConfig::default(), || 1.0)
            .expect("advance");
        assert_eq!(agent.status, TripStatus::Dropoff);
        assert_eq!(agent.position, here);
    }

    #[test]
    fn transition_rules() {
        assert_eq!(detect_transition(Some("Texas"), &resolved(Some("Texas"))), None);
        assert_eq!(detect_transition(Some("Texas"), &ZoneResult::degraded()), None);
        assert_eq!(detect_transition(None, &ZoneResult::degraded()), None);
        assert_eq!(
            detect_transition(None, &resolved(Some("Texas"))),
            Some(ZoneTransition {
                exited: None,
                entered: Some("Texas".into())
            })
        );
        assert_eq!(
            detect_transition(Some("Texas"), &resolved(None)),
            Some(ZoneTransition {
                exited: Some("Texas".into()),
                entered: None
            })
        );
    }

    #[test]
    fn compound_transition_emits_exit_then_enter() {
        let transition = detect_transition(Some("Rhode Island"), &resolved(Some("Massachusetts")))
            .expect("transition");
        let events = transition.into_events(
            "taxi",
            point(42.0, -71.3),
            Utc::now(),
            EventSource::Simulation,
        );
        let summary: Vec<_> = events.iter().map(|e| (e.kind, e.zone.as_str())).collect();
        assert_eq!(
            summary,
            [
                (TransitionKind::Exit, "Rhode Island"),
                (TransitionKind::Enter, "Massachusetts")
            ]
        );
        assert_eq!(events[0].to_zone.as_deref(), Some("Massachusetts"));
        assert_eq!(events[1].from_zone.as_deref(), Some("Rhode Island"));
    }

    #[test]
    fn degraded_read_keeps_zone() {
        let mut agent = AgentState::new("taxi", vec![providence_to_boston()], 1.0).expect("agent");
        agent.apply_classification(&resolved(Some("Rhode Island")), Utc::now());
        let stamped = agent.last_classified_at;

        assert_eq!(agent.apply_classification(&ZoneResult::degraded(), Utc::now()), None);
        assert_eq!(agent.current_zone.as_deref(), Some("Rhode Island"));
        assert_eq!(agent.last_classified_at, stamped);

        agent.apply_classification(&resolved(Some("Massachusetts")), Utc::now());
        assert_eq!(agent.current_zone.as_deref(), Some("Massachusetts"));
        assert_eq!(agent.previous_zone.as_deref(), Some("Rhode Island"));
    }

    #[test]
    fn sampler_without_jitter_is_constant() {
        let sampler = SpeedSampler::new(&MotionConfig::default());
        assert_eq!(sampler.sample(), 1.0);
    }

    #[test]
    fn sampler_is_seeded_and_bounded() {
        let motion = MotionConfig {
            speed_jitter: 0.2,
            seed: 42,
            ..MotionConfig::default()
        };
        let a: Vec<f64> = {
            let s = SpeedSampler::new(&motion);
            (0..5).map(|_| s.sample()).collect()
        };
        let b: Vec<f64> = {
            let s = SpeedSampler::new(&motion);
            (0..5).map(|_| s.sample()).collect()
        };
        assert_eq!(a, b);
        assert!(a.iter().all(|f| (0.8..=1.2).contains(f)));

        let s = SpeedSampler::new(&motion);
        let first: Vec<f64> = (0..5).map(|_| s.sample()).collect();
        s.reseed();
        let again: Vec<f64> = (0..5).map(|_| s.sample()).collect();
        assert_eq!(first, again);
    }
}
