//! Sprint reporting: external reports, critical failure detection, and
//! layer consolidation.

mod consolidate;
mod failure;
mod report;

pub use consolidate::{consolidate, LayerSummary};
pub use failure::{first_critical_failure, has_critical_failure, FailureReport, FailureSignal};
pub use report::{SprintReport, SprintReports, SprintStatus};
