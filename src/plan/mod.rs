//! Dependency layer planning.

mod layer;
mod parser;
mod planner;

use std::io;

use thiserror::Error;

use crate::store::DocumentError;

pub use layer::{Layer, SprintDefinition, SprintPlan};
pub use parser::parse_markdown_plan;
pub use planner::{LayerPlanner, LayerStatus, LayerView, Readiness};

/// Errors loading a sprint plan or sprint report document.
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Document(#[from] DocumentError),

    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Invalid plan: {0}")]
    Invalid(String),
}
