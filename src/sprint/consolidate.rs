//! Layer result consolidation: a pure reduction over sprint reports.

use serde::{Deserialize, Serialize};

use super::report::{SprintReport, SprintStatus};

/// Aggregated verdict for one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerSummary {
    pub layer: u32,
    pub sprint_count: usize,
    pub tasks_total: u64,
    pub tasks_completed: u64,
    pub tests_passed: u64,
    pub duration_hours: f64,
    /// Sprints reported `failed` or with a failed hard gate.
    pub failed_sprints: Vec<String>,
    /// Sprints that have not reached `completed` or `failed` yet.
    pub pending_sprints: Vec<String>,
    pub all_succeeded: bool,
}

impl LayerSummary {
    /// Every sprint reached a final status.
    pub fn is_finished(&self) -> bool {
        self.pending_sprints.is_empty()
    }

    /// One-line summary for operators.
    pub fn summary(&self) -> String {
        if self.all_succeeded {
            format!(
                "Layer {}: {} sprints, {}/{} tasks, {} tests passed, {:.1}h",
                self.layer,
                self.sprint_count,
                self.tasks_completed,
                self.tasks_total,
                self.tests_passed,
                self.duration_hours
            )
        } else {
            format!(
                "Layer {}: {}/{} sprints failed. Failed: {}",
                self.layer,
                self.failed_sprints.len(),
                self.sprint_count,
                self.failed_sprints.join(", ")
            )
        }
    }
}

/// Sum the reported metrics of every sprint in the layer.
pub fn consolidate<'a>(
    layer: u32,
    reports: impl IntoIterator<Item = &'a SprintReport>,
) -> LayerSummary {
    let mut summary = LayerSummary {
        layer,
        sprint_count: 0,
        tasks_total: 0,
        tasks_completed: 0,
        tests_passed: 0,
        duration_hours: 0.0,
        failed_sprints: Vec::new(),
        pending_sprints: Vec::new(),
        all_succeeded: true,
    };

    for report in reports {
        summary.sprint_count += 1;
        summary.tasks_total += u64::from(report.tasks_total);
        summary.tasks_completed += u64::from(report.tasks_completed);
        summary.tests_passed += u64::from(report.tests_passed);
        summary.duration_hours += report.duration_hours;
        match report.effective_status() {
            SprintStatus::Failed => summary.failed_sprints.push(report.name.clone()),
            SprintStatus::Completed => {}
            SprintStatus::NotStarted | SprintStatus::InProgress => {
                summary.pending_sprints.push(report.name.clone())
            }
        }
    }

    summary.all_succeeded = summary.failed_sprints.is_empty();
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(name: &str, status: SprintStatus, tasks: u32, tests: u32, hours: f64) -> SprintReport {
        SprintReport {
            tasks_total: tasks,
            tasks_completed: if status == SprintStatus::Completed { tasks } else { 0 },
            tests_passed: tests,
            duration_hours: hours,
            ..SprintReport::new(name, status)
        }
    }

    #[test]
    fn test_sums_metrics() {
        let reports = vec![
            report("S01", SprintStatus::Completed, 10, 40, 5.0),
            report("S02", SprintStatus::Completed, 6, 12, 2.5),
        ];
        let summary = consolidate(1, &reports);
        assert_eq!(summary.sprint_count, 2);
        assert_eq!(summary.tasks_total, 16);
        assert_eq!(summary.tasks_completed, 16);
        assert_eq!(summary.tests_passed, 52);
        assert!((summary.duration_hours - 7.5).abs() < f64::EPSILON);
        assert!(summary.all_succeeded);
        assert!(summary.is_finished());
    }

    #[test]
    fn test_collects_failed_sprints() {
        let reports = vec![
            report("S01", SprintStatus::Completed, 10, 40, 5.0),
            report("S03", SprintStatus::Failed, 8, 3, 4.0),
        ];
        let summary = consolidate(2, &reports);
        assert!(!summary.all_succeeded);
        assert_eq!(summary.failed_sprints, vec!["S03".to_string()]);
        assert_eq!(summary.summary(), "Layer 2: 1/2 sprints failed. Failed: S03");
    }

    #[test]
    fn test_pending_sprints_are_not_failures() {
        let reports = vec![report("S04", SprintStatus::InProgress, 5, 0, 1.0)];
        let summary = consolidate(3, &reports);
        assert!(summary.all_succeeded);
        assert!(!summary.is_finished());
        assert_eq!(summary.pending_sprints, vec!["S04".to_string()]);
    }

    #[test]
    fn test_gate_signal_lists_sprint_as_failed() {
        let mut s03 = report("S03", SprintStatus::InProgress, 8, 3, 4.0);
        s03.ci_failed = true;
        let reports = vec![report("S01", SprintStatus::Completed, 10, 40, 5.0), s03];

        let summary = consolidate(1, &reports);
        assert!(!summary.all_succeeded);
        assert_eq!(summary.failed_sprints, vec!["S03".to_string()]);
        assert!(summary.pending_sprints.is_empty());
    }

    #[test]
    fn test_empty_layer() {
        let summary = consolidate(1, &[]);
        assert_eq!(summary.sprint_count, 0);
        assert!(summary.all_succeeded);
    }
}
