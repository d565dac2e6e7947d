//! Layer ordering over a plan and a workflow snapshot.
//!
//! A layer is complete when every member epic is `Integrated` or `Released`.
//! A failed layer is terminal too, but it holds the planner in place: no
//! later layer becomes executable until an operator clears the failure.

use serde::{Deserialize, Serialize};

use super::layer::{Layer, SprintPlan};
use crate::epic::EpicState;
use crate::sprint::FailureReport;
use crate::workflow::WorkflowState;

/// Where a layer stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerStatus {
    /// No member has started.
    Pending,
    /// Some member is past `ContractsLocked` but not all are done.
    Active,
    Complete,
    Failed,
}

impl LayerStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, LayerStatus::Complete | LayerStatus::Failed)
    }
}

impl std::fmt::Display for LayerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            LayerStatus::Pending => "pending",
            LayerStatus::Active => "active",
            LayerStatus::Complete => "complete",
            LayerStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Whether work may start in a layer right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// A lower layer still has unfinished members.
    WaitingOn { layer: u32 },
    /// A lower layer is marked failed.
    BlockedBy { layer: u32, failure: FailureReport },
    /// Serial layer with another member already implementing.
    SerialBusy { layer: u32, epic: String },
}

/// Per-layer view for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerView {
    pub index: u32,
    pub status: LayerStatus,
    pub executable: bool,
    pub parallelizable: bool,
    pub members: Vec<String>,
    pub epics: Vec<(String, EpicState)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReport>,
}

/// Read-only planner over one plan and one workflow snapshot.
pub struct LayerPlanner<'a> {
    plan: &'a SprintPlan,
    state: &'a WorkflowState,
}

impl<'a> LayerPlanner<'a> {
    pub fn new(plan: &'a SprintPlan, state: &'a WorkflowState) -> Self {
        Self { plan, state }
    }

    /// Member epic states; an epic not yet in the workflow counts as `Planned`.
    fn member_states(&self, layer: &Layer) -> Vec<(String, EpicState)> {
        self.plan
            .resolve_epics(layer)
            .into_iter()
            .map(|name| {
                let state = self
                    .state
                    .epic(&name)
                    .map_or(EpicState::Planned, |e| e.state);
                (name, state)
            })
            .collect()
    }

    fn status_of(&self, layer: &Layer) -> LayerStatus {
        if self.state.failed_layers.contains_key(&layer.index) {
            return LayerStatus::Failed;
        }
        let members = self.member_states(layer);
        if members.iter().all(|(_, s)| s.is_terminal_for_layer()) {
            LayerStatus::Complete
        } else if members
            .iter()
            .any(|(_, s)| !matches!(s, EpicState::Planned | EpicState::ContractsLocked))
        {
            LayerStatus::Active
        } else {
            LayerStatus::Pending
        }
    }

    pub fn layer_status(&self, index: u32) -> Option<LayerStatus> {
        self.plan.layer(index).map(|layer| self.status_of(layer))
    }

    /// Lowest-numbered layer that is not complete, or `None` when every
    /// layer is complete (or the plan is empty).
    pub fn current_layer(&self) -> Option<u32> {
        self.plan
            .layers
            .iter()
            .find(|layer| self.status_of(layer) != LayerStatus::Complete)
            .map(|layer| layer.index)
    }

    pub fn all_complete(&self) -> bool {
        !self.plan.layers.is_empty() && self.current_layer().is_none()
    }

    fn lower_layer_readiness(&self, index: u32) -> Readiness {
        for layer in self.plan.layers.iter().filter(|l| l.index < index) {
            match self.status_of(layer) {
                LayerStatus::Complete => {}
                LayerStatus::Failed => {
                    if let Some(failure) = self.state.failed_layers.get(&layer.index) {
                        return Readiness::BlockedBy {
                            layer: layer.index,
                            failure: failure.clone(),
                        };
                    }
                }
                LayerStatus::Pending | LayerStatus::Active => {
                    return Readiness::WaitingOn { layer: layer.index };
                }
            }
        }
        Readiness::Ready
    }

    fn implementing_members(&self, layer: &Layer) -> Vec<String> {
        self.member_states(layer)
            .into_iter()
            .filter(|(_, s)| *s == EpicState::Implementing)
            .map(|(name, _)| name)
            .collect()
    }

    /// Every lower layer is complete and, for a serial layer, at most one
    /// member is implementing.
    pub fn is_executable(&self, index: u32) -> bool {
        let Some(layer) = self.plan.layer(index) else {
            return false;
        };
        if self.lower_layer_readiness(index) != Readiness::Ready {
            return false;
        }
        layer.parallelizable || self.implementing_members(layer).len() <= 1
    }

    /// Whether `epic` may start implementing now. Epics outside the plan are
    /// always ready.
    pub fn readiness_for(&self, epic: &str) -> Readiness {
        let Some(index) = self.plan.layer_of_epic(epic) else {
            return Readiness::Ready;
        };
        let readiness = self.lower_layer_readiness(index);
        if readiness != Readiness::Ready {
            return readiness;
        }
        if let Some(layer) = self.plan.layer(index) {
            if !layer.parallelizable {
                if let Some(busy) = self
                    .implementing_members(layer)
                    .into_iter()
                    .find(|name| name != epic)
                {
                    return Readiness::SerialBusy { layer: index, epic: busy };
                }
            }
        }
        Readiness::Ready
    }

    pub fn views(&self) -> Vec<LayerView> {
        self.plan
            .layers
            .iter()
            .map(|layer| LayerView {
                index: layer.index,
                status: self.status_of(layer),
                executable: self.is_executable(layer.index),
                parallelizable: layer.parallelizable,
                members: layer.members.clone(),
                epics: self.member_states(layer),
                failure: self.state.failed_layers.get(&layer.index).cloned(),
            })
            .collect()
    }
}
