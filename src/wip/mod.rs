//! WIP-limited slot allocation.
//!
//! The allocator is rebuilt from the epics that are currently implementing
//! every time it is needed, so slot occupancy can never drift from the
//! persisted epic states. It is a pure capacity check: a denied request is
//! reported back to the caller, which decides whether to retry later.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::epic::{Epic, EpicState};
use crate::error::{SchedulerError, SchedulerResult};
use crate::workflow::WorkflowState;

/// A granted execution slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    pub agent: String,
    pub epic: String,
    /// Slots the agent holds including this one.
    pub held: u32,
}

/// Outcome of a slot request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotDecision {
    Granted(Slot),
    /// The agent is at capacity; try again later.
    Denied { agent: String, held: u32, max: u32 },
}

impl SlotDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, SlotDecision::Granted(_))
    }
}

/// Occupied versus total slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WipUtilization {
    pub occupied: u32,
    pub total: u32,
    pub per_agent: BTreeMap<String, u32>,
}

impl WipUtilization {
    /// Fraction of slots in use, 0.0 when there are no slots.
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.occupied as f64 / self.total as f64
        }
    }
}

impl fmt::Display for WipUtilization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.occupied, self.total)
    }
}

/// Per-agent slot ledger derived from a workflow snapshot.
#[derive(Debug, Clone)]
pub struct SlotAllocator {
    max_per_agent: u32,
    roster: BTreeSet<String>,
    held: BTreeMap<String, BTreeSet<String>>,
}

impl SlotAllocator {
    /// Rebuild the ledger from the epics currently implementing.
    pub fn from_state(state: &WorkflowState) -> Self {
        let mut held: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for epic in state.epics_in(EpicState::Implementing) {
            if let Some(agent) = &epic.agent {
                held.entry(agent.clone())
                    .or_default()
                    .insert(epic.name.clone());
            }
        }

        let mut roster: BTreeSet<String> = state.wip_limits.agents.iter().cloned().collect();
        roster.extend(held.keys().cloned());

        Self {
            max_per_agent: state.wip_limits.max_per_agent.max(1),
            roster,
            held,
        }
    }

    /// Number of slots `agent` currently holds.
    pub fn held(&self, agent: &str) -> u32 {
        self.held.get(agent).map_or(0, |epics| epics.len() as u32)
    }

    /// Request a slot for `epic` on behalf of `agent`.
    ///
    /// Only epics waiting to start (`ContractsLocked`) or resume (`Parked`)
    /// may hold a slot request.
    pub fn acquire_slot(&mut self, agent: &str, epic: &Epic) -> SchedulerResult<SlotDecision> {
        if !matches!(epic.state, EpicState::ContractsLocked | EpicState::Parked) {
            return Err(SchedulerError::precondition(
                &epic.name,
                format!("cannot request a slot while {}", epic.state),
            ));
        }

        let held = self.held(agent);
        if held >= self.max_per_agent {
            debug!(agent, epic = %epic.name, held, max = self.max_per_agent, "slot denied");
            return Ok(SlotDecision::Denied {
                agent: agent.to_string(),
                held,
                max: self.max_per_agent,
            });
        }

        self.held
            .entry(agent.to_string())
            .or_default()
            .insert(epic.name.clone());
        self.roster.insert(agent.to_string());
        debug!(agent, epic = %epic.name, held = held + 1, "slot granted");

        Ok(SlotDecision::Granted(Slot {
            agent: agent.to_string(),
            epic: epic.name.clone(),
            held: held + 1,
        }))
    }

    /// Release the slot `agent` holds for `epic`.
    ///
    /// Returns whether a slot was actually freed; releasing a slot that is not
    /// held is a no-op.
    pub fn release_slot(&mut self, agent: &str, epic: &str) -> bool {
        let Some(epics) = self.held.get_mut(agent) else {
            return false;
        };
        let released = epics.remove(epic);
        if epics.is_empty() {
            self.held.remove(agent);
        }
        if released {
            debug!(agent, epic, "slot released");
        }
        released
    }

    /// Current utilization across the roster.
    pub fn utilization(&self) -> WipUtilization {
        let per_agent: BTreeMap<String, u32> = self
            .roster
            .iter()
            .map(|agent| (agent.clone(), self.held(agent)))
            .collect();
        WipUtilization {
            occupied: per_agent.values().sum(),
            total: self.max_per_agent * self.roster.len() as u32,
            per_agent,
        }
    }
}
