//! Background tick loop for the simulated fleet.
//!
//! One Tokio task ticks at a fixed interval. A tick snapshots the agents,
//! advances each, classifies all positions concurrently, applies transitions,
//! then commits the agents and appends the events. Ticks never overlap: a slow
//! tick delays the next one, and a manual [`SimulationScheduler::tick`] waits
//! for a running one.
//!
//! `stop` is cooperative. It signals the loop and waits for the current tick,
//! including its in-flight classifications, before returning. The running
//! flag is cleared by the loop itself on exit, so a loop that dies on a panic
//! reads as stopped and can be started again.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::agent::{AgentState, SpeedSampler};
use crate::classifier::{ZoneClassifier, ZoneResult};
use crate::config::MotionConfig;
use crate::config::AgentSpec;
use crate::error::{GeofenceError, GeofenceResult};
use crate::geo::{GeoPoint, Route};
use crate::sink::SinkWriter;
use crate::store::FleetStateStore;
use crate::trace::{EventSource, EventTrace, TransitionEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    Stopped,
    NotRunning,
}

/// Summary of one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub tick: u64,
    pub agents: usize,
    pub events: usize,
    pub degraded: usize,
    pub leg_changes: usize,
}

struct TickContext {
    store: Arc<FleetStateStore>,
    trace: Arc<EventTrace>,
    classifier: Arc<ZoneClassifier>,
    sink: Option<Arc<SinkWriter>>,
    motion: MotionConfig,
    sampler: SpeedSampler,
    ticks: AtomicU64,
    tick_lock: Mutex<()>,
}

struct RunHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RunHandle {
    /// Signal the loop and wait for it to exit.
    async fn finish(self) {
        // The loop may already have exited; a closed channel is fine.
        let _ = self.shutdown.send(true);
        if let Err(error) = self.task.await {
            warn!(%error, "simulation loop ended abnormally");
        }
    }
}

pub struct SimulationScheduler {
    ctx: Arc<TickContext>,
    run: Mutex<Option<RunHandle>>,
    running: Arc<AtomicBool>,
}

/// Clears the running flag when the loop task ends, however it ends.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SimulationScheduler {
    pub fn new(
        store: Arc<FleetStateStore>,
        trace: Arc<EventTrace>,
        classifier: Arc<ZoneClassifier>,
        sink: Option<Arc<SinkWriter>>,
        motion: MotionConfig,
    ) -> Self {
        let ctx = TickContext {
            store,
            trace,
            classifier,
            sink,
            sampler: SpeedSampler::new(&motion),
            motion,
            ticks: AtomicU64::new(0),
            tick_lock: Mutex::new(()),
        };
        Self {
            ctx: Arc::new(ctx),
            run: Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Register an agent at the pickup of its first leg.
    pub fn add_agent(&self, id: &str, legs: Vec<Route>) -> GeofenceResult<()> {
        let agent = AgentState::new(id, legs, self.ctx.sampler.sample())?;
        self.ctx.store.insert(agent)
    }

    /// Begin ticking every `interval`. A second call while running is a no-op.
    ///
    /// A zero interval is rejected before any task is spawned.
    pub async fn start(&self, interval: Duration) -> GeofenceResult<StartOutcome> {
        if interval.is_zero() {
            return Err(GeofenceError::InvalidConfig {
                reason: "tick interval must be greater than zero".into(),
            });
        }

        let mut run = self.run.lock().await;
        if let Some(handle) = run.as_ref() {
            if !handle.task.is_finished() {
                warn!("simulation already running");
                return Ok(StartOutcome::AlreadyRunning);
            }
            warn!("previous simulation loop had exited; starting a new one");
            if let Some(stale) = run.take() {
                stale.finish().await;
            }
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let ctx = Arc::clone(&self.ctx);
        self.running.store(true, Ordering::SeqCst);
        let guard = RunningGuard(Arc::clone(&self.running));
        let task = tokio::spawn(run_loop(ctx, interval, shutdown_rx, guard));
        *run = Some(RunHandle { shutdown, task });
        info!(
            interval_ms = interval.as_millis() as u64,
            agents = self.ctx.store.len(),
            "simulation started"
        );
        Ok(StartOutcome::Started)
    }

    /// Stop ticking and wait for the current tick to finish.
    pub async fn stop(&self) -> StopOutcome {
        let mut run = self.run.lock().await;
        let Some(handle) = run.take() else {
            warn!("simulation not running");
            return StopOutcome::NotRunning;
        };

        handle.finish().await;
        info!(ticks = self.ticks(), "simulation stopped");
        StopOutcome::Stopped
    }

    /// Stop if running, then rebuild the fleet from `fleet` and clear the
    /// trace. The tick counter keeps counting.
    pub async fn reset(&self, fleet: Vec<AgentSpec>) -> GeofenceResult<usize> {
        // The run lock keeps `start` out and the tick lock keeps manual ticks out.
        let mut run = self.run.lock().await;
        if let Some(handle) = run.take() {
            handle.finish().await;
            info!(ticks = self.ticks(), "simulation stopped for reset");
        }
        let _tick = self.ctx.tick_lock.lock().await;

        self.ctx.store.clear();
        self.ctx.trace.clear();
        self.ctx.sampler.reseed();
        for spec in fleet {
            self.add_agent(&spec.id, spec.legs)?;
        }
        let agents = self.ctx.store.len();
        info!(agents, "simulation reset");
        Ok(agents)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run one tick now, as if `elapsed` had passed since the previous one.
    pub async fn tick(&self, elapsed: Duration) -> TickReport {
        self.ctx.tick(elapsed).await
    }

    /// Ticks completed since creation.
    pub fn ticks(&self) -> u64 {
        self.ctx.ticks.load(Ordering::SeqCst)
    }
}

async fn run_loop(
    ctx: Arc<TickContext>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
    _running: RunningGuard,
) {
    let mut last = Instant::now();
    let mut ticker = tokio::time::interval_at(last + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                let now = Instant::now();
                let elapsed = now - last;
                last = now;
                ctx.tick(elapsed).await;
            }
        }
    }
    debug!("simulation loop exited");
}

impl TickContext {
    async fn tick(&self, elapsed: Duration) -> TickReport {
        let _guard = self.tick_lock.lock().await;
        let tick = self.ticks.load(Ordering::SeqCst) + 1;
        let elapsed_secs = elapsed.as_secs_f64();

        let mut agents = self.store.snapshot_all().agents;
        let mut leg_changes = 0;
        for agent in &mut agents {
            match agent.advance(elapsed_secs, &self.motion, || self.sampler.sample()) {
                Ok(true) => {
                    leg_changes += 1;
                    info!(
                        agent_id = %agent.id,
                        leg = agent.leg_index,
                        speed_factor = agent.speed_factor,
                        "agent started next leg"
                    );
                }
                Ok(false) => {}
                Err(error) => warn!(agent_id = %agent.id, %error, "failed to advance agent"),
            }
        }

        let width = agents.len().max(1);
        let classifier = &self.classifier;
        let points: Vec<GeoPoint> = agents.iter().map(|a| a.position).collect();
        let results: Vec<ZoneResult> = stream::iter(points)
            .map(|point| classifier.classify(point))
            .buffered(width)
            .collect()
            .await;

        let now = Utc::now();
        let mut events: Vec<TransitionEvent> = Vec::new();
        let mut degraded = 0;
        for (agent, result) in agents.iter_mut().zip(&results) {
            if result.degraded {
                degraded += 1;
                continue;
            }
            let Some(transition) = agent.apply_classification(result, now) else {
                continue;
            };
            for event in transition.into_events(&agent.id, agent.position, now, EventSource::Simulation) {
                info!(
                    agent_id = %event.agent_id,
                    kind = ?event.kind,
                    zone = %event.zone,
                    "zone transition"
                );
                events.push(event);
            }
        }

        let agent_count = agents.len();
        self.store.commit(agents);
        if !events.is_empty() {
            self.trace.append_all(events.iter().cloned());
            if let Some(sink) = &self.sink {
                for event in &events {
                    sink.submit(event.clone());
                }
            }
        }
        if degraded > 0 {
            warn!(tick, degraded, "zone classification degraded for some agents");
        }
        self.ticks.store(tick, Ordering::SeqCst);
        debug!(tick, agents = agent_count, events = events.len(), "tick complete");

        TickReport {
            tick,
            agents: agent_count,
            events: events.len(),
            degraded,
            leg_changes,
        }
    }
}
