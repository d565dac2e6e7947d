//! Error taxonomy for the scheduler.
//!
//! Capacity pressure is deliberately absent from this enum: a denied slot is
//! the [`AssignOutcome::Queued`](crate::scheduler::AssignOutcome::Queued)
//! value, not a failure.

use thiserror::Error;

use crate::epic::EpicState;
use crate::journal::JournalError;
use crate::plan::PlanError;
use crate::sprint::FailureReport;
use crate::store::StoreError;

/// Kind of identifier a lookup failed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Epic,
    Sprint,
    Layer,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            EntityKind::Epic => "epic",
            EntityKind::Sprint => "sprint",
            EntityKind::Layer => "layer",
        };
        f.write_str(label)
    }
}

/// Errors surfaced by the scheduler facade and its components.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// The requested state change is not in the transition table.
    #[error("Invalid transition for epic '{epic}': {from} -> {to}")]
    InvalidTransition {
        epic: String,
        from: EpicState,
        to: EpicState,
    },

    /// The transition exists but a required field or condition is missing.
    #[error("Precondition failed for epic '{epic}': {reason}")]
    PreconditionFailed { epic: String, reason: String },

    /// Referenced identifier does not exist in the current workflow.
    #[error("{kind} '{id}' not found")]
    NotFound { kind: EntityKind, id: String },

    /// A hard gate failed; the owning layer is blocked until cleared.
    #[error("Blocked, needs a decision: {0}")]
    CriticalFailureDetected(FailureReport),

    /// State document could not be read or written.
    #[error("State store error: {0}")]
    Store(#[from] StoreError),

    /// Sprint plan or report document could not be loaded.
    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    /// Journal could not be read.
    #[error("Journal error: {0}")]
    Journal(#[from] JournalError),

    /// Configuration could not be assembled.
    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),
}

impl SchedulerError {
    pub(crate) fn precondition(epic: impl Into<String>, reason: impl Into<String>) -> Self {
        SchedulerError::PreconditionFailed {
            epic: epic.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        SchedulerError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// True for errors caused by the caller's request rather than the environment.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SchedulerError::InvalidTransition { .. }
                | SchedulerError::PreconditionFailed { .. }
                | SchedulerError::NotFound { .. }
        )
    }
}

/// Result type for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;
