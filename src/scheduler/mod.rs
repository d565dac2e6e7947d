//! Workflow facade: validated transitions, WIP slots, layer gating and
//! consolidation behind one atomic read-modify-write per operation.

mod facade;
mod outcome;

pub use facade::Scheduler;
pub use outcome::{AssignOutcome, ConsolidationReport, EpicListing, ListFilter, QueueReason};
