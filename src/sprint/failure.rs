//! Critical failure detection.
//!
//! Any single hard gate signal (CI, security, deployment) is enough to block
//! the owning layer. There is no threshold and no automatic retry.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::report::SprintReport;

/// A hard gate that can fail a sprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureSignal {
    CiPipeline,
    SecurityScan,
    Deployment,
}

impl FailureSignal {
    /// Human-readable description naming the failing gate.
    pub fn describe(self) -> &'static str {
        match self {
            FailureSignal::CiPipeline => "CI pipeline failed",
            FailureSignal::SecurityScan => "security scan failed",
            FailureSignal::Deployment => "deployment failed",
        }
    }
}

impl fmt::Display for FailureSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// A detected critical failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureReport {
    pub sprint: String,
    pub signals: Vec<FailureSignal>,
    pub detected_at: DateTime<Utc>,
}

impl FailureReport {
    /// Signals joined into a single reason, e.g. "CI pipeline failed".
    pub fn reason(&self) -> String {
        self.signals
            .iter()
            .map(|s| s.describe())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sprint {}: {}", self.sprint, self.reason())
    }
}

/// Inspect a sprint's gate signals.
pub fn has_critical_failure(report: &SprintReport) -> Option<FailureReport> {
    let mut signals = Vec::new();
    if report.ci_failed {
        signals.push(FailureSignal::CiPipeline);
    }
    if report.security_failed {
        signals.push(FailureSignal::SecurityScan);
    }
    if report.deployment_failed {
        signals.push(FailureSignal::Deployment);
    }

    if signals.is_empty() {
        return None;
    }

    let failure = FailureReport {
        sprint: report.name.clone(),
        signals,
        detected_at: Utc::now(),
    };
    warn!(sprint = %failure.sprint, reason = %failure.reason(), "critical failure detected");
    Some(failure)
}

/// First critical failure among `reports`, in order.
pub fn first_critical_failure<'a>(
    reports: impl IntoIterator<Item = &'a SprintReport>,
) -> Option<FailureReport> {
    reports.into_iter().find_map(has_critical_failure)
}
