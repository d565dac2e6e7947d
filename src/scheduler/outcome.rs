//! Values returned by the scheduler facade.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::epic::{Epic, EpicState};
use crate::plan::LayerStatus;
use crate::sprint::{FailureReport, LayerSummary};
use crate::wip::WipUtilization;

/// Why an assignment was queued instead of started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueueReason {
    /// The agent already holds its maximum number of slots.
    AgentAtCapacity { agent: String, held: u32, max: u32 },
    /// A lower layer has unfinished members.
    LayerNotReady { layer: u32 },
    /// The epic's layer is serial and another member is implementing.
    SerialLayerBusy { layer: u32, epic: String },
}

impl fmt::Display for QueueReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueReason::AgentAtCapacity { agent, held, max } => {
                write!(f, "agent '{}' holds {}/{} slots", agent, held, max)
            }
            QueueReason::LayerNotReady { layer } => {
                write!(f, "waiting for layer {} to finish", layer)
            }
            QueueReason::SerialLayerBusy { layer, epic } => {
                write!(f, "layer {} is serial and '{}' is implementing", layer, epic)
            }
        }
    }
}

/// Result of `assign` or `resume`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AssignOutcome {
    /// The epic is now implementing.
    Assigned { epic: Epic },
    /// Queued, not broken: retry later.
    Queued { epic: Epic, reason: QueueReason },
}

impl AssignOutcome {
    pub fn epic(&self) -> &Epic {
        match self {
            AssignOutcome::Assigned { epic } | AssignOutcome::Queued { epic, .. } => epic,
        }
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, AssignOutcome::Queued { .. })
    }
}

/// Filter for `list`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub state: Option<EpicState>,
    pub agent: Option<String>,
    pub waiting_only: bool,
}

impl ListFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn in_state(state: EpicState) -> Self {
        Self {
            state: Some(state),
            ..Self::default()
        }
    }

    pub fn matches(&self, epic: &Epic) -> bool {
        self.state.map_or(true, |s| epic.state == s)
            && self
                .agent
                .as_deref()
                .map_or(true, |a| epic.agent.as_deref() == Some(a))
            && (!self.waiting_only || epic.waiting_for_slot)
    }
}

/// Read-only projection of the workflow, grouped by state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpicListing {
    pub groups: BTreeMap<EpicState, Vec<Epic>>,
    pub total: usize,
    /// `"occupied/total"`.
    pub wip: String,
    pub utilization: WipUtilization,
    pub waiting_for_slot: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_layer: Option<u32>,
    pub archived: bool,
}

/// Combined consolidation and critical failure verdict for a layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidationReport {
    pub summary: LayerSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical_failure: Option<FailureReport>,
    pub layer_status: LayerStatus,
    pub all_succeeded: bool,
}

impl ConsolidationReport {
    /// Operator-facing verdict line.
    pub fn verdict(&self) -> String {
        match &self.critical_failure {
            Some(failure) => format!(
                "Layer {} blocked, needs a decision: {}",
                self.summary.layer, failure
            ),
            None => self.summary.summary(),
        }
    }
}
