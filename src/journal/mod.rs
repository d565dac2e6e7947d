//! Transition journal.

mod record;
mod store;

pub use record::{JournalRecord, JOURNAL_SCHEMA_VERSION};
pub use store::{Journal, JournalError, JournalResult, DEFAULT_RETENTION_DAYS};
