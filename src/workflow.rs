//! Root aggregate: one document per feature/workspace.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::epic::{Epic, EpicState};
use crate::error::{EntityKind, SchedulerError, SchedulerResult};
use crate::sprint::FailureReport;

/// Default number of concurrent epics per agent.
pub const DEFAULT_MAX_PER_AGENT: u32 = 1;

fn default_max_per_agent() -> u32 {
    DEFAULT_MAX_PER_AGENT
}

/// WIP limit configuration.
///
/// Occupancy is never stored here; it is recomputed from the epics that are
/// currently implementing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WipLimits {
    #[serde(default = "default_max_per_agent")]
    pub max_per_agent: u32,
    /// Agents known to the workflow; an agent joins on its first grant.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub agents: Vec<String>,
}

impl Default for WipLimits {
    fn default() -> Self {
        Self {
            max_per_agent: DEFAULT_MAX_PER_AGENT,
            agents: Vec::new(),
        }
    }
}

impl WipLimits {
    pub fn new(max_per_agent: u32) -> Self {
        Self {
            max_per_agent: max_per_agent.max(1),
            agents: Vec::new(),
        }
    }

    /// Add an agent to the roster if it is not already present.
    pub fn register_agent(&mut self, agent: &str) {
        if !self.agents.iter().any(|a| a == agent) {
            self.agents.push(agent.to_string());
        }
    }
}

/// Scheduling state for one feature/workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState {
    #[serde(default)]
    pub epics: Vec<Epic>,
    #[serde(default)]
    pub wip_limits: WipLimits,
    /// 1-based number of the layer the planner is holding on; 0 when no
    /// layer is pending.
    #[serde(default)]
    pub current_layer_index: u32,
    /// Layers blocked by a critical failure, keyed by layer number.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub failed_layers: BTreeMap<u32, FailureReport>,
    /// Stamped on first load when the document predates the field.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PER_AGENT)
    }
}

impl WorkflowState {
    pub fn new(max_per_agent: u32) -> Self {
        Self {
            epics: Vec::new(),
            wip_limits: WipLimits::new(max_per_agent),
            current_layer_index: 0,
            failed_layers: BTreeMap::new(),
            created_at: Utc::now(),
            archived_at: None,
        }
    }

    pub fn epic(&self, name: &str) -> Option<&Epic> {
        self.epics.iter().find(|e| e.name == name)
    }

    pub fn epic_mut(&mut self, name: &str) -> Option<&mut Epic> {
        self.epics.iter_mut().find(|e| e.name == name)
    }

    /// Look up an epic or fail with `NotFound`.
    pub fn require_epic(&self, name: &str) -> SchedulerResult<&Epic> {
        self.epic(name)
            .ok_or_else(|| SchedulerError::not_found(EntityKind::Epic, name))
    }

    pub fn require_epic_mut(&mut self, name: &str) -> SchedulerResult<&mut Epic> {
        self.epic_mut(name)
            .ok_or_else(|| SchedulerError::not_found(EntityKind::Epic, name))
    }

    /// Insert a new `Planned` epic.
    pub fn add_epic(&mut self, epic: Epic) -> SchedulerResult<&Epic> {
        if epic.name.trim().is_empty() {
            return Err(SchedulerError::precondition(
                &epic.name,
                "epic name must not be empty",
            ));
        }
        if self.epic(&epic.name).is_some() {
            return Err(SchedulerError::precondition(
                &epic.name,
                "an epic with this name already exists",
            ));
        }
        self.epics.push(epic);
        Ok(&self.epics[self.epics.len() - 1])
    }

    /// Epics in the given state.
    pub fn epics_in(&self, state: EpicState) -> impl Iterator<Item = &Epic> {
        self.epics.iter().filter(move |e| e.state == state)
    }

    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }

    /// Structural invariants checked whenever a document is loaded.
    pub fn validate(&self) -> Result<(), String> {
        let mut names = HashSet::new();
        for epic in &self.epics {
            if !names.insert(epic.name.as_str()) {
                return Err(format!("duplicate epic '{}'", epic.name));
            }
            epic.check_invariants()?;
        }
        if self.wip_limits.max_per_agent == 0 {
            return Err("maxPerAgent must be positive".to_string());
        }

        let mut held: BTreeMap<&str, u32> = BTreeMap::new();
        for epic in self.epics_in(EpicState::Implementing) {
            if let Some(agent) = epic.agent.as_deref() {
                *held.entry(agent).or_default() += 1;
            }
        }
        if let Some((agent, count)) = held
            .iter()
            .find(|(_, count)| **count > self.wip_limits.max_per_agent)
        {
            return Err(format!(
                "agent '{}' holds {} slots (max {})",
                agent, count, self.wip_limits.max_per_agent
            ));
        }
        Ok(())
    }
}
