//! Human and JSON rendering of scheduler results.

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;

use epicflow::{
    AssignOutcome, ConsolidationReport, Epic, EpicListing, FailureReport, JournalRecord,
    LayerStatus, LayerView,
};

use crate::Exit;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error: String,
    exit_code: u8,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CriticalBody<'a> {
    sprint: &'a str,
    critical_failure: Option<&'a FailureReport>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClearedBody {
    layer: u32,
    cleared: bool,
}

pub struct Printer {
    json: bool,
}

impl Printer {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    fn emit<T: Serialize>(&self, value: &T) {
        match serde_json::to_string_pretty(value) {
            Ok(text) => println!("{}", text),
            Err(err) => eprintln!("{} failed to encode output: {}", "error:".red(), err),
        }
    }

    pub fn epic(&self, verb: &str, epic: &Epic) {
        if self.json {
            return self.emit(epic);
        }
        println!("{} {}", verb.green().bold(), describe(epic));
    }

    pub fn assignment(&self, outcome: &AssignOutcome) -> Exit {
        if self.json {
            self.emit(outcome);
        } else {
            match outcome {
                AssignOutcome::Assigned { epic } => {
                    println!("{} {}", "Implementing".green().bold(), describe(epic));
                }
                AssignOutcome::Queued { epic, reason } => {
                    println!(
                        "{} {}: {} (queued, not broken; retry later)",
                        "Queued".yellow().bold(),
                        epic.name,
                        reason
                    );
                }
            }
        }
        if outcome.is_queued() {
            Exit::Queued
        } else {
            Exit::Success
        }
    }

    pub fn listing(&self, listing: &EpicListing) {
        if self.json {
            return self.emit(listing);
        }
        println!("{} {}", "WIP".bold(), listing.wip);
        if let Some(layer) = listing.current_layer {
            println!("{} {}", "Current layer".bold(), layer);
        }
        if listing.archived {
            println!("{}", "Workflow archived".dimmed());
        }
        for (state, epics) in &listing.groups {
            println!();
            println!("{} ({})", state.to_string().cyan().bold(), epics.len());
            for epic in epics {
                println!("  {}", describe(epic));
            }
        }
        if listing.total == 0 {
            println!("{}", "No epics".dimmed());
        }
    }

    pub fn layers(&self, views: &[LayerView]) {
        if self.json {
            return self.emit(&views);
        }
        if views.is_empty() {
            println!("{}", "No layers planned".dimmed());
            return;
        }
        for view in views {
            let status = match view.status {
                LayerStatus::Complete => view.status.to_string().green(),
                LayerStatus::Failed => view.status.to_string().red().bold(),
                LayerStatus::Active => view.status.to_string().yellow(),
                LayerStatus::Pending => view.status.to_string().normal(),
            };
            let mode = if view.parallelizable { "parallel" } else { "serial" };
            let ready = if view.executable { "executable" } else { "waiting" };
            println!("Layer {} [{}] {} {}", view.index, status, mode, ready.dimmed());
            for (name, state) in &view.epics {
                println!("  {} {}", name, state.to_string().dimmed());
            }
            if let Some(failure) = &view.failure {
                println!("  {} {}", "blocked:".red(), failure);
            }
        }
    }

    pub fn consolidation(&self, report: &ConsolidationReport) -> Exit {
        if self.json {
            self.emit(report);
        } else if report.critical_failure.is_some() {
            println!("{}", report.verdict().red().bold());
        } else if report.all_succeeded {
            println!("{}", report.verdict().green());
        } else {
            println!("{}", report.verdict().yellow());
            if !report.summary.pending_sprints.is_empty() {
                println!("  pending: {}", report.summary.pending_sprints.join(", "));
            }
        }
        if report.critical_failure.is_some() {
            Exit::Blocked
        } else {
            Exit::Success
        }
    }

    pub fn critical(&self, sprint: &str, failure: Option<&FailureReport>) -> Exit {
        if self.json {
            self.emit(&CriticalBody {
                sprint,
                critical_failure: failure,
            });
        } else {
            match failure {
                Some(failure) => println!(
                    "{} {}",
                    "Blocked, needs a decision:".red().bold(),
                    failure
                ),
                None => println!("{} sprint {}: no critical failure", "OK".green(), sprint),
            }
        }
        if failure.is_some() {
            Exit::Blocked
        } else {
            Exit::Success
        }
    }

    pub fn cleared(&self, layer: u32, cleared: bool) {
        if self.json {
            return self.emit(&ClearedBody { layer, cleared });
        }
        if cleared {
            println!("{} layer {}", "Cleared".green().bold(), layer);
        } else {
            println!("Layer {} was not failed", layer);
        }
    }

    pub fn history(&self, epic: &str, records: &[JournalRecord]) {
        if self.json {
            return self.emit(&records);
        }
        if records.is_empty() {
            println!("{}", format!("No history for {}", epic).dimmed());
            return;
        }
        for record in records {
            let mut line = format!("{} {}", timestamp(&record.recorded_at), record.operation);
            if let (Some(from), Some(to)) = (record.from, record.to) {
                line.push_str(&format!(" {} -> {}", from, to));
            }
            if let Some(agent) = &record.agent {
                line.push_str(&format!(" by {}", agent));
            }
            if let Some(detail) = &record.detail {
                line.push_str(&format!(" ({})", detail));
            }
            println!("{}", line);
        }
    }

    pub fn error(&self, err: &anyhow::Error, exit: Exit) {
        if self.json {
            self.emit(&ErrorBody {
                error: format!("{:#}", err),
                exit_code: exit as u8,
            });
        }
        eprintln!("{} {:#}", "error:".red().bold(), err);
    }
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn describe(epic: &Epic) -> String {
    let mut line = format!(
        "{} [{}] {}/{} tasks",
        epic.name, epic.state, epic.tasks_complete, epic.tasks_total
    );
    if let Some(agent) = &epic.agent {
        line.push_str(&format!(" agent={}", agent));
    }
    if let Some(started) = &epic.started_at {
        let hours = (Utc::now() - *started).num_hours();
        line.push_str(&format!(" started={} ({}h)", timestamp(started), hours));
    }
    if let (Some(reason), Some(blocked_by)) = (&epic.parked_reason, &epic.blocked_by) {
        line.push_str(&format!(" parked: {} (blocked by {})", reason, blocked_by));
    }
    if epic.waiting_for_slot {
        line.push_str(" waiting-for-slot");
    }
    if let Some(failure) = &epic.failure {
        line.push_str(&format!(" failed: {}", failure));
    }
    line
}
