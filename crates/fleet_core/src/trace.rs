//! Bounded event trace: the most recent zone transitions, oldest overwritten
//! first.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::geo::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionKind {
    Enter,
    Exit,
}

/// Where the position behind an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    Simulation,
    Ingest,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionEvent {
    pub agent_id: String,
    pub kind: TransitionKind,
    /// The zone exited or entered.
    pub zone: String,
    pub from_zone: Option<String>,
    pub to_zone: Option<String>,
    pub position: GeoPoint,
    pub occurred_at: DateTime<Utc>,
    pub source: EventSource,
}

struct Ring {
    slots: Vec<Option<TransitionEvent>>,
    /// Index of the next write.
    head: usize,
    len: usize,
    total: u64,
}

pub struct EventTrace {
    ring: Mutex<Ring>,
}

impl EventTrace {
    /// `capacity` of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ring: Mutex::new(Ring {
                slots: vec![None; capacity],
                head: 0,
                len: 0,
                total: 0,
            }),
        }
    }

    pub fn append(&self, event: TransitionEvent) {
        let mut ring = self.ring.lock();
        ring.push(event);
    }

    /// Append a batch under one lock so readers never see half of it.
    pub fn append_all(&self, events: impl IntoIterator<Item = TransitionEvent>) {
        let mut ring = self.ring.lock();
        for event in events {
            ring.push(event);
        }
    }

    /// Up to `n` most recent events, oldest first.
    pub fn recent(&self, n: usize) -> Vec<TransitionEvent> {
        let ring = self.ring.lock();
        let take = n.min(ring.len);
        let capacity = ring.slots.len();
        let start = (ring.head + capacity - take) % capacity;
        (0..take)
            .filter_map(|offset| ring.slots[(start + offset) % capacity].clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.ring.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.ring.lock().slots.len()
    }

    /// Drop every held event. `total_appended` keeps counting.
    pub fn clear(&self) {
        let mut ring = self.ring.lock();
        ring.slots.iter_mut().for_each(|slot| *slot = None);
        ring.head = 0;
        ring.len = 0;
    }

    /// Events appended since creation, including overwritten ones.
    pub fn total_appended(&self) -> u64 {
        self.ring.lock().total
    }
}

impl Ring {
    fn push(&mut self, event: TransitionEvent) {
        let capacity = self.slots.len();
        self.slots[self.head] = Some(event);
        self.head = (self.head + 1) % capacity;
        self.len = (self.len + 1).min(capacity);
        self.total += 1;
    }
}
