//! The epic record and its guarded transitions.
//!
//! Every transition method validates all of its preconditions before it
//! touches a field, so a failed call leaves the epic exactly as it was.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::state::EpicState;
use crate::error::{SchedulerError, SchedulerResult};

/// A unit of parallel implementation work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Epic {
    pub name: String,
    pub state: EpicState,
    /// Owning worker, present only while `Implementing`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contracts_locked_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parked_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parked_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<String>,
    #[serde(default)]
    pub tasks_complete: u32,
    #[serde(default)]
    pub tasks_total: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_flag: Option<String>,
    #[serde(default)]
    pub waiting_for_slot: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub released_at: Option<DateTime<Utc>>,
    /// Reason the epic was abandoned; `None` for a normal release.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl Epic {
    /// Create a new epic in `Planned`.
    pub fn new(name: impl Into<String>, tasks_total: u32) -> Self {
        Self {
            name: name.into(),
            state: EpicState::Planned,
            agent: None,
            started_at: None,
            contracts_locked_at: None,
            parked_at: None,
            parked_reason: None,
            blocked_by: None,
            tasks_complete: 0,
            tasks_total,
            feature_flag: None,
            waiting_for_slot: false,
            review_started_at: None,
            integrated_at: None,
            released_at: None,
            failure: None,
        }
    }

    /// Default feature flag name for an epic that was never given one.
    pub fn default_feature_flag(name: &str) -> String {
        let slug: String = name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("ff_{}", slug.trim_matches('_'))
    }

    /// Integrated, or released without a failure.
    pub fn is_terminal_success(&self) -> bool {
        match self.state {
            EpicState::Integrated => true,
            EpicState::Released => self.failure.is_none(),
            _ => false,
        }
    }

    fn ensure_transition(&self, to: EpicState) -> SchedulerResult<()> {
        if self.state.can_transition_to(to) {
            Ok(())
        } else {
            Err(SchedulerError::InvalidTransition {
                epic: self.name.clone(),
                from: self.state,
                to,
            })
        }
    }

    fn move_to(&mut self, to: EpicState) {
        debug!(epic = %self.name, from = %self.state, to = %to, "epic transition");
        self.state = to;
    }

    /// `Planned → ContractsLocked`.
    pub fn lock_contracts(&mut self, now: DateTime<Utc>) -> SchedulerResult<()> {
        self.ensure_transition(EpicState::ContractsLocked)?;
        self.contracts_locked_at = Some(now);
        self.move_to(EpicState::ContractsLocked);
        Ok(())
    }

    /// `ContractsLocked → Implementing` or `Parked → Implementing`.
    ///
    /// The caller must already hold a WIP slot for `agent`.
    pub fn start_implementing(
        &mut self,
        agent: &str,
        feature_flag: Option<String>,
        now: DateTime<Utc>,
    ) -> SchedulerResult<()> {
        self.ensure_transition(EpicState::Implementing)?;
        if agent.trim().is_empty() {
            return Err(SchedulerError::precondition(
                &self.name,
                "an agent is required to start implementing",
            ));
        }
        if self.contracts_locked_at.is_none() {
            return Err(SchedulerError::precondition(
                &self.name,
                "contracts must be locked before implementation",
            ));
        }

        let flag = feature_flag
            .or_else(|| self.feature_flag.clone())
            .unwrap_or_else(|| Self::default_feature_flag(&self.name));

        self.agent = Some(agent.to_string());
        self.started_at = Some(now);
        self.feature_flag = Some(flag);
        self.waiting_for_slot = false;
        self.parked_at = None;
        self.parked_reason = None;
        self.blocked_by = None;
        self.move_to(EpicState::Implementing);
        Ok(())
    }

    /// `Implementing → Parked`. Disassociates the agent.
    pub fn park(
        &mut self,
        reason: &str,
        blocked_by: &str,
        now: DateTime<Utc>,
    ) -> SchedulerResult<()> {
        if self.state != EpicState::Implementing {
            return Err(SchedulerError::precondition(
                &self.name,
                format!("only implementing epics can be parked (state is {})", self.state),
            ));
        }
        if reason.trim().is_empty() || blocked_by.trim().is_empty() {
            return Err(SchedulerError::precondition(
                &self.name,
                "parking requires both a reason and a blocker",
            ));
        }

        self.agent = None;
        self.started_at = None;
        self.parked_at = Some(now);
        self.parked_reason = Some(reason.to_string());
        self.blocked_by = Some(blocked_by.to_string());
        self.move_to(EpicState::Parked);
        Ok(())
    }

    /// `Implementing → Review`; every task must be complete.
    pub fn submit_for_review(&mut self, now: DateTime<Utc>) -> SchedulerResult<()> {
        self.ensure_transition(EpicState::Review)?;
        if self.tasks_total == 0 {
            return Err(SchedulerError::precondition(
                &self.name,
                "cannot review an epic with no tasks",
            ));
        }
        if self.tasks_complete != self.tasks_total {
            return Err(SchedulerError::precondition(
                &self.name,
                format!(
                    "{}/{} tasks complete",
                    self.tasks_complete, self.tasks_total
                ),
            ));
        }

        self.agent = None;
        self.started_at = None;
        self.review_started_at = Some(now);
        self.move_to(EpicState::Review);
        Ok(())
    }

    /// `Review → Integrated`.
    pub fn integrate(&mut self, now: DateTime<Utc>) -> SchedulerResult<()> {
        self.ensure_transition(EpicState::Integrated)?;
        self.integrated_at = Some(now);
        self.move_to(EpicState::Integrated);
        Ok(())
    }

    /// `Integrated → Released`.
    pub fn release(&mut self, now: DateTime<Utc>) -> SchedulerResult<()> {
        if self.state != EpicState::Integrated {
            return Err(SchedulerError::InvalidTransition {
                epic: self.name.clone(),
                from: self.state,
                to: EpicState::Released,
            });
        }
        self.released_at = Some(now);
        self.move_to(EpicState::Released);
        Ok(())
    }

    /// `Implementing|Review → Released` with a failure reason.
    pub fn abandon(&mut self, reason: &str, now: DateTime<Utc>) -> SchedulerResult<()> {
        if !matches!(self.state, EpicState::Implementing | EpicState::Review) {
            return Err(SchedulerError::InvalidTransition {
                epic: self.name.clone(),
                from: self.state,
                to: EpicState::Released,
            });
        }
        if reason.trim().is_empty() {
            return Err(SchedulerError::precondition(
                &self.name,
                "abandoning requires a reason",
            ));
        }

        self.agent = None;
        self.started_at = None;
        self.failure = Some(reason.to_string());
        self.released_at = Some(now);
        self.move_to(EpicState::Released);
        Ok(())
    }

    /// Record reported task counters.
    pub fn record_progress(&mut self, tasks_complete: u32, tasks_total: u32) -> SchedulerResult<()> {
        if tasks_complete > tasks_total {
            return Err(SchedulerError::precondition(
                &self.name,
                format!(
                    "tasks complete ({}) exceeds tasks total ({})",
                    tasks_complete, tasks_total
                ),
            ));
        }
        if self.state.is_terminal_for_layer() {
            return Err(SchedulerError::precondition(
                &self.name,
                format!("progress cannot change once {}", self.state),
            ));
        }
        self.tasks_complete = tasks_complete;
        self.tasks_total = tasks_total;
        Ok(())
    }

    /// Field invariants tied to the current state.
    pub fn check_invariants(&self) -> Result<(), String> {
        let implementing = self.state == EpicState::Implementing;
        let parked = self.state == EpicState::Parked;

        if self.tasks_complete > self.tasks_total {
            return Err(format!(
                "epic '{}': tasksComplete {} > tasksTotal {}",
                self.name, self.tasks_complete, self.tasks_total
            ));
        }
        if (self.agent.is_some() && self.started_at.is_some()) != implementing
            || (self.agent.is_some() != self.started_at.is_some())
        {
            return Err(format!(
                "epic '{}': agent/startedAt must be set exactly while implementing",
                self.name
            ));
        }
        if implementing && self.feature_flag.is_none() {
            return Err(format!(
                "epic '{}': implementing without a feature flag",
                self.name
            ));
        }
        let parked_fields = self.parked_at.is_some()
            && self.parked_reason.is_some()
            && self.blocked_by.is_some();
        let any_parked_field = self.parked_at.is_some()
            || self.parked_reason.is_some()
            || self.blocked_by.is_some();
        if parked != parked_fields || (!parked && any_parked_field) {
            return Err(format!(
                "epic '{}': parkedAt/parkedReason/blockedBy must be set exactly while parked",
                self.name
            ));
        }
        if self.waiting_for_slot && self.state != EpicState::ContractsLocked {
            return Err(format!(
                "epic '{}': waitingForSlot set while {}",
                self.name, self.state
            ));
        }
        if self.state != EpicState::Planned && self.contracts_locked_at.is_none() {
            return Err(format!(
                "epic '{}': {} without contractsLockedAt",
                self.name, self.state
            ));
        }
        Ok(())
    }
}
