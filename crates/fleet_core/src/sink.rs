//! Best-effort persistence of transition events.
//!
//! The scheduler never writes to a sink directly. It hands events to a
//! [`SinkWriter`], whose bounded queue is drained on a blocking worker. A full
//! queue drops the event and a failed write is logged; neither reaches the
//! tick.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::SinkKind;
use crate::error::{GeofenceError, GeofenceResult};
use crate::trace::TransitionEvent;

pub trait EventSink: Send + Sync {
    fn write_event(&self, event: &TransitionEvent) -> Result<(), String>;
}

/// Discards everything.
pub struct NullSink;

impl EventSink for NullSink {
    fn write_event(&self, _event: &TransitionEvent) -> Result<(), String> {
        Ok(())
    }
}

/// Appends one JSON object per line.
pub struct JsonLinesSink {
    path: PathBuf,
    file: Mutex<BufWriter<File>>,
}

impl JsonLinesSink {
    pub fn open(path: impl AsRef<Path>) -> GeofenceResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| GeofenceError::SinkUnavailable {
                reason: format!("cannot open '{}': {e}", path.display()),
            })?;
        Ok(Self {
            path,
            file: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSink for JsonLinesSink {
    fn write_event(&self, event: &TransitionEvent) -> Result<(), String> {
        let line = serde_json::to_string(event).map_err(|e| e.to_string())?;
        let mut file = self.file.lock();
        writeln!(file, "{line}").map_err(|e| e.to_string())?;
        file.flush().map_err(|e| e.to_string())
    }
}

pub fn build_sink(kind: &SinkKind) -> GeofenceResult<Arc<dyn EventSink>> {
    match kind {
        SinkKind::None => Ok(Arc::new(NullSink)),
        SinkKind::JsonLines { path } => Ok(Arc::new(JsonLinesSink::open(path)?)),
    }
}

#[derive(Default)]
struct SinkCounters {
    written: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Write-behind front for an [`EventSink`].
pub struct SinkWriter {
    tx: mpsc::Sender<TransitionEvent>,
    counters: Arc<SinkCounters>,
}

impl SinkWriter {
    /// Start the drain worker on the current Tokio runtime.
    pub fn spawn(sink: Arc<dyn EventSink>, queue: usize) -> GeofenceResult<Self> {
        let handle = Handle::try_current().map_err(|e| GeofenceError::RuntimeUnavailable {
            reason: e.to_string(),
        })?;
        let (tx, mut rx) = mpsc::channel::<TransitionEvent>(queue.max(1));
        let counters = Arc::new(SinkCounters::default());
        let worker_counters = Arc::clone(&counters);

        handle.spawn_blocking(move || {
            while let Some(event) = rx.blocking_recv() {
                match sink.write_event(&event) {
                    Ok(()) => {
                        worker_counters.written.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(error) => {
                        worker_counters.failed.fetch_add(1, Ordering::Relaxed);
                        warn!(agent_id = %event.agent_id, %error, "event sink write failed");
                    }
                }
            }
            debug!("event sink writer drained");
        });

        Ok(Self { tx, counters })
    }

    /// Queue an event without waiting. Returns `false` if it was dropped.
    pub fn submit(&self, event: TransitionEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(agent_id = %event.agent_id, "event sink queue full, dropping event");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    pub fn written(&self) -> u64 {
        self.counters.written.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.counters.failed.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.counters.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoPoint;
    use crate::trace::{EventSource, TransitionKind};
    use chrono::Utc;

    fn event(zone: &str) -> TransitionEvent {
        TransitionEvent {
            agent_id: "taxi_a".into(),
            kind: TransitionKind::Enter,
            zone: zone.into(),
            from_zone: None,
            to_zone: Some(zone.into()),
            position: GeoPoint::new(41.58, -71.48).expect("point"),
            occurred_at: Utc::now(),
            source: EventSource::Simulation,
        }
    }

    #[test]
    fn json_lines_appends_one_object_per_line() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("events.jsonl");
        let sink = JsonLinesSink::open(&path).expect("open");
        sink.write_event(&event("Rhode Island")).expect("write");
        sink.write_event(&event("Massachusetts")).expect("write");

        let raw = std::fs::read_to_string(&path).expect("read");
        let lines: Vec<serde_json::Value> = raw
            .lines()
            .map(|l| serde_json::from_str(l).expect("json"))
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["zone"], "Rhode Island");
        assert_eq!(lines[1]["kind"], "enter");
        assert_eq!(lines[1]["source"], "simulation");
    }

    #[test]
    fn open_fails_for_missing_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("missing").join("events.jsonl");
        assert!(matches!(
            JsonLinesSink::open(path),
            Err(GeofenceError::SinkUnavailable { .. })
        ));
    }

    #[test]
    fn spawn_requires_runtime() {
        assert!(matches!(
            SinkWriter::spawn(Arc::new(NullSink), 4),
            Err(GeofenceError::RuntimeUnavailable { .. })
        ));
    }
}
