//! Shared fleet state: agent id → [`AgentState`], readable while the
//! scheduler writes.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::agent::AgentState;
use crate::error::{GeofenceError, GeofenceResult};

/// Point-in-time copy of every agent, in insertion order.
#[derive(Debug, Clone, Serialize)]
pub struct FleetSnapshot {
    pub taken_at: DateTime<Utc>,
    pub agents: Vec<AgentState>,
}

impl FleetSnapshot {
    pub fn get(&self, agent_id: &str) -> Option<&AgentState> {
        self.agents.iter().find(|a| a.id == agent_id)
    }
}

#[derive(Default)]
struct Inner {
    order: Vec<String>,
    agents: HashMap<String, AgentState>,
}

#[derive(Default)]
pub struct FleetStateStore {
    inner: RwLock<Inner>,
}

impl FleetStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new agent; fails if the id is taken.
    pub fn insert(&self, state: AgentState) -> GeofenceResult<()> {
        let mut inner = self.inner.write();
        if inner.agents.contains_key(&state.id) {
            return Err(GeofenceError::DuplicateAgent { agent_id: state.id });
        }
        inner.order.push(state.id.clone());
        inner.agents.insert(state.id.clone(), state);
        Ok(())
    }

    /// Insert or replace. A replaced agent keeps its position in the order.
    pub fn upsert(&self, state: AgentState) {
        let mut inner = self.inner.write();
        if !inner.agents.contains_key(&state.id) {
            inner.order.push(state.id.clone());
        }
        inner.agents.insert(state.id.clone(), state);
    }

    /// Write back a batch of updated agents under a single lock.
    ///
    /// Agents removed since they were read are skipped, never resurrected.
    /// Returns how many were written.
    pub fn commit(&self, states: impl IntoIterator<Item = AgentState>) -> usize {
        let mut inner = self.inner.write();
        let mut written = 0;
        for state in states {
            if let Some(slot) = inner.agents.get_mut(&state.id) {
                *slot = state;
                written += 1;
            }
        }
        written
    }

    pub fn remove(&self, agent_id: &str) -> Option<AgentState> {
        let mut inner = self.inner.write();
        let removed = inner.agents.remove(agent_id)?;
        inner.order.retain(|id| id != agent_id);
        Some(removed)
    }

    /// Remove every agent.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.order.clear();
        inner.agents.clear();
    }

    pub fn get(&self, agent_id: &str) -> Option<AgentState> {
        self.inner.read().agents.get(agent_id).cloned()
    }

    pub fn snapshot_all(&self) -> FleetSnapshot {
        let inner = self.inner.read();
        FleetSnapshot {
            taken_at: Utc::now(),
            agents: inner.ordered().cloned().collect(),
        }
    }

    /// Ids of agents whose current zone is exactly `zone`, in insertion order.
    pub fn find_by_zone(&self, zone: &str) -> Vec<String> {
        let inner = self.inner.read();
        inner
            .ordered()
            .filter(|a| a.current_zone.as_deref() == Some(zone))
            .map(|a| a.id.clone())
            .collect()
    }

    pub fn ids(&self) -> Vec<String> {
        self.inner.read().order.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Inner {
    fn ordered(&self) -> impl Iterator<Item = &AgentState> {
        self.order.iter().filter_map(|id| self.agents.get(id))
    }
}
