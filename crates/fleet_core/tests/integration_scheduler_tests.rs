mod support;

use std::sync::Arc;
use std::time::Duration;

use fleet_core::agent::TripStatus;
use fleet_core::geo::{GeoPoint, Route};
use fleet_core::scheduler::{StartOutcome, StopOutcome};
use fleet_core::test_helpers::{BoundaryZoneProvider, ScriptedZoneProvider};
use fleet_core::trace::{EventSource, TransitionKind};
use fleet_core::zones::{ZoneLookup, ZoneProvider};
use fleet_core::GeofenceError;
use futures::future::BoxFuture;
use support::{point, ri_ma_provider, TestEngineBuilder, RI_MA_BORDER_LAT};

const ONE_SEC: Duration = Duration::from_secs(1);

fn summary(events: &[fleet_core::trace::TransitionEvent]) -> Vec<(TransitionKind, String)> {
    events.iter().map(|e| (e.kind, e.zone.clone())).collect()
}

#[tokio::test]
async fn providence_to_boston_crosses_into_massachusetts() {
    let engine = TestEngineBuilder::providence_taxi().build();

    let first = engine.tick(ONE_SEC).await;
    assert_eq!(first.events, 1);
    assert_eq!(
        engine.get_agent("taxi_ri").and_then(|a| a.current_zone),
        Some("Rhode Island".to_string())
    );

    for _ in 0..4 {
        engine.tick(ONE_SEC).await;
    }
    let agent = engine.get_agent("taxi_ri").expect("agent");
    assert!((agent.progress - 0.5).abs() < 1e-6, "progress {}", agent.progress);
    assert_eq!(agent.status, TripStatus::Enroute);
    assert_eq!(agent.current_zone.as_deref(), Some("Massachusetts"));
    assert_eq!(agent.previous_zone.as_deref(), Some("Rhode Island"));

    let events = engine.recent_events(10);
    assert_eq!(
        summary(&events),
        [
            (TransitionKind::Enter, "Rhode Island".to_string()),
            (TransitionKind::Exit, "Rhode Island".to_string()),
            (TransitionKind::Enter, "Massachusetts".to_string()),
        ]
    );
    assert!(events.iter().all(|e| e.source == EventSource::Simulation));
    // Exit and enter of one crossing share the tick's position.
    assert_eq!(events[1].position, events[2].position);
    assert!(events[1].position.latitude() > support::RI_MA_BORDER_LAT);
}

#[tokio::test]
async fn progress_wraps_to_pickup_after_dropoff() {
    let engine = TestEngineBuilder::providence_taxi().build();
    let mut trail = Vec::new();
    for _ in 0..12 {
        engine.tick(ONE_SEC).await;
        let agent = engine.get_agent("taxi_ri").expect("agent");
        trail.push((agent.progress, agent.status));
    }

    for window in trail.windows(2) {
        let (prev, next) = (window[0], window[1]);
        match prev.1 {
            TripStatus::Dropoff => assert_eq!(next, (0.0, TripStatus::Pickup)),
            _ => assert!(next.0 > prev.0, "progress went backwards mid-leg"),
        }
    }
    assert_eq!(trail[9], (1.0, TripStatus::Dropoff));
    assert_eq!(trail[10], (0.0, TripStatus::Pickup));
    assert!((trail[11].0 - 0.1).abs() < 1e-6);

    let agent = engine.get_agent("taxi_ri").expect("agent");
    let expected = 41.82 + (42.36 - 41.82) * agent.progress;
    assert!((agent.position.latitude() - expected).abs() < 1e-9);
}

#[tokio::test]
async fn degraded_reads_hold_zone_until_provider_recovers() {
    let provider = ri_ma_provider();
    let engine = TestEngineBuilder::providence_taxi()
        .with_provider(provider.clone())
        .build();

    engine.tick(ONE_SEC).await;
    provider.set_failing(true);
    for _ in 0..4 {
        let report = engine.tick(ONE_SEC).await;
        assert_eq!(report.degraded, 1);
        assert_eq!(report.events, 0);
    }
    let agent = engine.get_agent("taxi_ri").expect("agent");
    assert!(agent.position.latitude() > support::RI_MA_BORDER_LAT);
    assert_eq!(agent.current_zone.as_deref(), Some("Rhode Island"));
    assert_eq!(engine.recent_events(10).len(), 1);
    assert_eq!(engine.search_by_zone("Rhode Island"), ["taxi_ri"]);

    provider.set_failing(false);
    let report = engine.tick(ONE_SEC).await;
    assert_eq!(report.events, 2);
    assert_eq!(
        summary(&engine.recent_events(2)),
        [
            (TransitionKind::Exit, "Rhode Island".to_string()),
            (TransitionKind::Enter, "Massachusetts".to_string()),
        ]
    );
}

#[tokio::test]
async fn start_and_stop_are_idempotent() {
    let engine = TestEngineBuilder::providence_taxi().build();
    assert!(!engine.is_running());
    assert_eq!(engine.stop_simulation().await, StopOutcome::NotRunning);

    let started = engine.start_simulation_every(Duration::from_secs(60)).await;
    assert_eq!(started.expect("start"), StartOutcome::Started);
    assert!(engine.is_running());
    let again = engine.start_simulation_every(Duration::from_secs(60)).await;
    assert_eq!(again.expect("start"), StartOutcome::AlreadyRunning);

    assert_eq!(engine.stop_simulation().await, StopOutcome::Stopped);
    assert!(!engine.is_running());
    assert_eq!(engine.stop_simulation().await, StopOutcome::NotRunning);
}

#[tokio::test(start_paused = true)]
async fn restart_resumes_without_duplicating_agents() {
    let engine = TestEngineBuilder::providence_taxi()
        .with_agent("taxi_back", vec![support::providence_to_boston()])
        .build();

    engine.start_simulation_every(ONE_SEC).await.expect("start");
    tokio::time::sleep(Duration::from_millis(3_500)).await;
    engine.stop_simulation().await;
    assert_eq!(engine.scheduler().ticks(), 3);

    // Time spent stopped does not count as travel.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(engine.scheduler().ticks(), 3);

    engine.start_simulation_every(ONE_SEC).await.expect("start");
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    engine.stop_simulation().await;
    assert_eq!(engine.scheduler().ticks(), 5);

    let status = engine.get_status();
    let ids: Vec<_> = status.agents.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, ["taxi_ri", "taxi_back"]);
    for agent in &status.agents {
        assert!((agent.progress - 0.5).abs() < 1e-6, "{} at {}", agent.id, agent.progress);
    }
}

#[tokio::test]
async fn removed_agent_is_not_resurrected_by_tick() {
    let engine = TestEngineBuilder::providence_taxi()
        .with_agent("taxi_gone", vec![support::providence_to_boston()])
        .build();
    engine.tick(ONE_SEC).await;
    engine.remove_agent("taxi_gone").expect("removed");
    let report = engine.tick(ONE_SEC).await;
    assert_eq!(report.agents, 1);
    assert!(engine.get_agent("taxi_gone").is_none());
    assert!(engine.remove_agent("taxi_gone").is_err());
}

#[tokio::test]
async fn zero_interval_is_rejected() {
    let engine = TestEngineBuilder::providence_taxi().build();
    let result = engine.start_simulation_every(Duration::ZERO).await;
    assert!(matches!(result, Err(GeofenceError::InvalidConfig { .. })));
    assert!(!engine.is_running());
    assert_eq!(engine.stop_simulation().await, StopOutcome::NotRunning);
    assert_eq!(engine.scheduler().ticks(), 0);
}

#[tokio::test(start_paused = true)]
async fn stop_waits_for_in_flight_tick() {
    let provider = Arc::new(
        ScriptedZoneProvider::constant(Some("Texas")).with_delay(Duration::from_secs(2)),
    );
    let engine = TestEngineBuilder::providence_taxi()
        .with_provider(provider.clone())
        .build();

    engine.start_simulation_every(ONE_SEC).await.expect("start");
    // The first tick starts at 1s and its lookup is still running at 1.5s.
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(provider.in_flight(), 1);
    assert_eq!(engine.stop_simulation().await, StopOutcome::Stopped);

    assert!(!engine.is_running());
    assert_eq!(provider.in_flight(), 0);
    assert_eq!(engine.scheduler().ticks(), 1);
    assert_eq!(
        engine.get_agent("taxi_ri").and_then(|a| a.current_zone),
        Some("Texas".to_string())
    );
    assert_eq!(summary(&engine.recent_events(10)), [(TransitionKind::Enter, "Texas".to_string())]);
}

#[tokio::test]
async fn failing_agent_does_not_stall_others() {
    let provider = Arc::new(
        BoundaryZoneProvider::new(RI_MA_BORDER_LAT, "Rhode Island", "Massachusetts")
            .with_failures_west_of(-80.0),
    );
    let west = Route::new(point(31.0, -100.0), point(32.0, -100.5));
    let engine = TestEngineBuilder::providence_taxi()
        .with_agent("taxi_west", vec![west])
        .with_provider(provider)
        .build();

    for _ in 0..5 {
        let report = engine.tick(ONE_SEC).await;
        assert_eq!(report.agents, 2);
        assert_eq!(report.degraded, 1);
    }

    let ri = engine.get_agent("taxi_ri").expect("agent");
    assert_eq!(ri.current_zone.as_deref(), Some("Massachusetts"));
    let stuck = engine.get_agent("taxi_west").expect("agent");
    assert!(stuck.progress > 0.0, "degraded agent still moves");
    assert_eq!(stuck.current_zone, None);
    assert_eq!(stuck.last_classified_at, None);
    assert!(engine.recent_events(10).iter().all(|e| e.agent_id == "taxi_ri"));
}

/// Panics on every lookup, taking the tick down with it.
struct PanickingZoneProvider;

impl ZoneProvider for PanickingZoneProvider {
    fn lookup(&self, _point: GeoPoint) -> BoxFuture<'_, ZoneLookup> {
        panic!("zone backend crashed");
    }
}

#[tokio::test(start_paused = true)]
async fn crashed_loop_reads_as_stopped_and_can_restart() {
    let engine = TestEngineBuilder::providence_taxi()
        .with_provider(Arc::new(PanickingZoneProvider))
        .build();

    engine.start_simulation_every(ONE_SEC).await.expect("start");
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert!(!engine.is_running());

    let restarted = engine.start_simulation_every(ONE_SEC).await;
    assert_eq!(restarted.expect("start"), StartOutcome::Started);
    assert!(engine.is_running());
    assert_eq!(engine.stop_simulation().await, StopOutcome::Stopped);
    assert!(!engine.is_running());
}
