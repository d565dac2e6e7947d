//! Sprint reports written by external collaborators.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::epic::{Epic, EpicState};
use crate::plan::PlanError;
use crate::store::DocumentFormat;

/// Reported status of a sprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SprintStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Failed,
}

impl SprintStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SprintStatus::NotStarted => "not_started",
            SprintStatus::InProgress => "in_progress",
            SprintStatus::Completed => "completed",
            SprintStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SprintStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metrics and gate signals a sprint reports about itself.
///
/// The scheduler never computes these; it only reads them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SprintReport {
    pub name: String,
    #[serde(default)]
    pub status: SprintStatus,
    #[serde(default)]
    pub tasks_total: u32,
    #[serde(default)]
    pub tasks_completed: u32,
    #[serde(default)]
    pub tests_passed: u32,
    #[serde(default)]
    pub duration_hours: f64,
    #[serde(default)]
    pub ci_failed: bool,
    #[serde(default)]
    pub security_failed: bool,
    #[serde(default)]
    pub deployment_failed: bool,
}

impl SprintReport {
    pub fn new(name: impl Into<String>, status: SprintStatus) -> Self {
        Self {
            name: name.into(),
            status,
            ..Default::default()
        }
    }

    /// Build a report for a sprint that has not written one, from the task
    /// counters and states of its planned epics. `None` stands for an epic
    /// the workflow has not registered yet; it counts as `Planned`. Gate
    /// signals are left clear.
    pub fn derive_from_epics(name: impl Into<String>, epics: &[Option<&Epic>]) -> Self {
        let registered = || epics.iter().flatten();
        let tasks_total = registered().map(|e| e.tasks_total).sum();
        let tasks_completed = registered().map(|e| e.tasks_complete).sum();
        let state_of = |epic: &Option<&Epic>| epic.map_or(EpicState::Planned, |e| e.state);

        let status = if epics.is_empty() {
            SprintStatus::NotStarted
        } else if epics.iter().all(|e| state_of(e).is_terminal_for_layer()) {
            if registered().any(|e| e.failure.is_some()) {
                SprintStatus::Failed
            } else {
                SprintStatus::Completed
            }
        } else if epics
            .iter()
            .any(|e| !matches!(state_of(e), EpicState::Planned | EpicState::ContractsLocked))
        {
            SprintStatus::InProgress
        } else {
            SprintStatus::NotStarted
        };

        Self {
            name: name.into(),
            status,
            tasks_total,
            tasks_completed,
            ..Default::default()
        }
    }

    /// Any hard gate (CI, security, deployment) reported a failure.
    pub fn has_gate_failure(&self) -> bool {
        self.ci_failed || self.security_failed || self.deployment_failed
    }

    /// Status used for consolidation: a failed hard gate fails the sprint
    /// whatever status the reporter wrote.
    pub fn effective_status(&self) -> SprintStatus {
        if self.has_gate_failure() {
            SprintStatus::Failed
        } else {
            self.status
        }
    }
}

/// The report document: every sprint report written so far.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SprintReports {
    reports: Vec<SprintReport>,
}

impl SprintReports {
    pub fn new(reports: Vec<SprintReport>) -> Self {
        Self { reports }
    }

    /// Load reports from a JSON or YAML list. A missing file means no
    /// sprint has reported yet.
    pub fn load(path: &Path) -> Result<Self, PlanError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no sprint reports yet");
                return Ok(Self::default());
            }
            Err(err) => return Err(PlanError::Io(err)),
        };
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let reports: Vec<SprintReport> = DocumentFormat::from_path(path).decode(&content)?;
        Ok(Self { reports })
    }

    pub fn get(&self, name: &str) -> Option<&SprintReport> {
        self.reports.iter().find(|r| r.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SprintReport> {
        self.reports.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }
}
