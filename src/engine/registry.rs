//! Correlation-id keyed store of running plans

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::common::errors::{EngineError, Result};
use crate::common::types::CorrelationId;
use crate::engine::machine::TradeMachine;
use crate::engine::types::{TradePlan, TradeState};

/// Persistable pair of a plan and its progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSnapshot {
    pub plan: TradePlan,
    pub state: TradeState,
}

impl From<PlanSnapshot> for TradeMachine {
    fn from(snapshot: PlanSnapshot) -> Self {
        TradeMachine::restore(snapshot.plan, snapshot.state)
    }
}

/// Lifecycle events are matched to plans only through this map
#[derive(Debug, Default)]
pub struct PlanRegistry {
    machines: HashMap<CorrelationId, TradeMachine>,
}

impl PlanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a machine, replacing any previous one with the same id
    pub fn insert(&mut self, machine: TradeMachine) -> Option<TradeMachine> {
        self.machines.insert(machine.correlation_id(), machine)
    }

    pub fn get(&self, id: &CorrelationId) -> Option<&TradeMachine> {
        self.machines.get(id)
    }

    /// Resolve a free-form tag from a lifecycle event to the plan that owns it
    pub fn route(&mut self, tag: &str) -> Result<&mut TradeMachine> {
        CorrelationId::parse(tag)
            .and_then(|id| self.machines.get_mut(&id))
            .ok_or_else(|| EngineError::StaleCorrelation(tag.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &TradeMachine> {
        self.machines.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut TradeMachine> {
        self.machines.values_mut()
    }

    pub fn len(&self) -> usize {
        self.machines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }

    /// True when every registered plan finished (vacuously true when empty)
    pub fn all_terminal(&self) -> bool {
        self.machines.values().all(TradeMachine::is_terminal)
    }

    pub fn snapshots(&self) -> Vec<PlanSnapshot> {
        let mut snapshots: Vec<PlanSnapshot> = self
            .machines
            .values()
            .map(|m| PlanSnapshot {
                plan: m.plan().clone(),
                state: m.state().clone(),
            })
            .collect();
        snapshots.sort_by_key(|s| s.plan.created_at);
        snapshots
    }
}
