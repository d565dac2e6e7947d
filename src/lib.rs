//! Epicflow schedules epics of work across agents.
//!
//! Epics move through a fixed lifecycle, agents hold a bounded number of
//! work-in-progress slots, and a layered sprint plan decides which epics may
//! start. A failed CI, security or deployment gate blocks the layers above it
//! until an operator clears it.
//!
//! ```no_run
//! use epicflow::{Scheduler, SchedulerConfig};
//!
//! # async fn run() -> epicflow::SchedulerResult<()> {
//! let config = SchedulerConfig::load(None)?;
//! let scheduler = Scheduler::open(&config)?;
//! scheduler.add_epic("epic-auth-api", 5).await?;
//! scheduler.lock_contracts("epic-auth-api").await?;
//! let outcome = scheduler.assign("epic-auth-api", "backend-agent").await?;
//! println!("{:?}", outcome);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod epic;
pub mod error;
pub mod journal;
pub mod plan;
pub mod scheduler;
pub mod sprint;
pub mod store;
pub mod wip;
pub mod workflow;

pub use crate::config::SchedulerConfig;
pub use epic::{Epic, EpicState};
pub use error::{EntityKind, SchedulerError, SchedulerResult};
pub use journal::{Journal, JournalRecord};
pub use plan::{Layer, LayerStatus, LayerView, SprintDefinition, SprintPlan};
pub use scheduler::{
    AssignOutcome, ConsolidationReport, EpicListing, ListFilter, QueueReason, Scheduler,
};
pub use sprint::{
    FailureReport, FailureSignal, LayerSummary, SprintReport, SprintReports, SprintStatus,
};
pub use store::{FileStateStore, MemoryStateStore, StateStore};
pub use wip::{SlotAllocator, SlotDecision, WipUtilization};
pub use workflow::{WipLimits, WorkflowState};
