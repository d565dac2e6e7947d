//! Markdown sprint-plan parsing.
//!
//! Reads a `## Layers` table and an optional `## Sprints` table:
//!
//! ```text
//! ## Layers
//! | Layer | Members            | Parallel |
//! |-------|--------------------|----------|
//! | 1     | S01, epic-infra    | yes      |
//! | 2     | S02                | no       |
//!
//! ## Sprints
//! | Sprint | Epics                          |
//! |--------|--------------------------------|
//! | S01    | epic-auth-api, epic-user-profile |
//! ```

use std::sync::OnceLock;

use regex::Regex;

use super::layer::{Layer, SprintDefinition, SprintPlan};
use super::PlanError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Layers,
    Sprints,
}

fn separator_row() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\|?\s*:?-{3,}:?\s*(\|\s*:?-{3,}:?\s*)*\|?$").expect("valid regex"))
}

fn layer_number() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)").expect("valid regex"))
}

/// Parse a markdown plan document.
pub fn parse_markdown_plan(markdown: &str) -> Result<SprintPlan, PlanError> {
    let mut section = Section::None;
    let mut header_seen = false;
    let mut layers = Vec::new();
    let mut sprints = Vec::new();

    for (line_no, raw) in markdown.lines().enumerate() {
        let line = raw.trim();
        let line_no = line_no + 1;

        if line.starts_with('#') {
            let level = line.chars().take_while(|c| *c == '#').count();
            let heading = line.trim_start_matches('#').trim().to_ascii_lowercase();
            section = if level < 2 {
                Section::None
            } else if heading.starts_with("layer") {
                Section::Layers
            } else if heading.starts_with("sprint") {
                Section::Sprints
            } else {
                Section::None
            };
            header_seen = false;
            continue;
        }

        if section == Section::None || !line.starts_with('|') {
            continue;
        }
        if separator_row().is_match(line) {
            continue;
        }
        if !header_seen {
            header_seen = true;
            continue;
        }

        let cells = split_row(line);
        match section {
            Section::Layers => layers.push(parse_layer_row(&cells, line_no)?),
            Section::Sprints => sprints.push(parse_sprint_row(&cells, line_no)?),
            Section::None => {}
        }
    }

    Ok(SprintPlan { layers, sprints })
}

fn split_row(line: &str) -> Vec<String> {
    let inner = line.trim().trim_start_matches('|').trim_end_matches('|');
    inner.split('|').map(|cell| cell.trim().to_string()).collect()
}

fn split_members(cell: &str) -> Vec<String> {
    cell.split(',')
        .map(|m| m.trim().trim_matches('`').trim().to_string())
        .filter(|m| !m.is_empty())
        .collect()
}

fn parse_layer_row(cells: &[String], line: usize) -> Result<Layer, PlanError> {
    let index_cell = cells.first().map(String::as_str).unwrap_or_default();
    let index = layer_number()
        .captures(index_cell)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .ok_or_else(|| PlanError::Parse {
            line,
            message: format!("no layer number in '{}'", index_cell),
        })?;

    let members = cells.get(1).map(|c| split_members(c)).unwrap_or_default();
    if members.is_empty() {
        return Err(PlanError::Parse {
            line,
            message: format!("layer {} has no members", index),
        });
    }

    let parallelizable = match cells.get(2) {
        Some(cell) if !cell.is_empty() => parse_parallel(cell).ok_or_else(|| PlanError::Parse {
            line,
            message: format!("cannot read parallel flag '{}'", cell),
        })?,
        _ => true,
    };

    Ok(Layer::new(index, members, parallelizable))
}

fn parse_sprint_row(cells: &[String], line: usize) -> Result<SprintDefinition, PlanError> {
    let name = cells
        .first()
        .map(|c| c.trim_matches('`').trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| PlanError::Parse {
            line,
            message: "sprint row without a name".to_string(),
        })?;
    let epics = cells.get(1).map(|c| split_members(c)).unwrap_or_default();
    Ok(SprintDefinition { name, epics })
}

fn parse_parallel(cell: &str) -> Option<bool> {
    match cell.trim().to_ascii_lowercase().as_str() {
        "yes" | "y" | "true" | "parallel" | "✓" | "✅" => Some(true),
        "no" | "n" | "false" | "serial" | "sequential" | "✗" | "❌" => Some(false),
        _ => None,
    }
}
