//! Persistence of the workflow state document.
//!
//! The store only loads and saves whole documents. Atomic read-modify-write
//! is built on top of it by the scheduler: take [`StateStore::lock`], load,
//! mutate a copy, save, drop the guard.

mod file;
mod format;
mod memory;

use std::fs::File;
use std::io;

use fs2::FileExt;
use thiserror::Error;

use crate::workflow::WorkflowState;

pub use file::FileStateStore;
pub use format::{DocumentError, DocumentFormat};
pub use memory::MemoryStateStore;

/// Errors that can occur while persisting workflow state.
#[derive(Error, Debug)]
pub enum StoreError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The document could not be encoded or decoded.
    #[error("{0}")]
    Document(#[from] DocumentError),

    /// The document decoded but violates a state invariant.
    #[error("Invalid workflow state: {0}")]
    Invalid(String),

    /// An in-process lock was poisoned by a panicking writer.
    #[error("State store lock poisoned")]
    Poisoned,
}

/// Result type for state store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Exclusive hold on the state document; released on drop.
#[derive(Debug)]
pub struct StoreGuard {
    file: Option<File>,
}

impl StoreGuard {
    /// A guard that holds nothing, for stores without cross-process access.
    pub fn unlocked() -> Self {
        Self { file: None }
    }

    /// Take an advisory exclusive lock on `file`, blocking until granted.
    pub fn exclusive(file: File) -> StoreResult<Self> {
        file.lock_exclusive()?;
        Ok(Self { file: Some(file) })
    }
}

impl Drop for StoreGuard {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(err) = FileExt::unlock(&file) {
                tracing::warn!(error = %err, "failed to release state lock");
            }
        }
    }
}

/// Load/save contract for the workflow state document.
pub trait StateStore: Send + Sync {
    /// Load the document; `None` when nothing has been saved yet.
    fn load(&self) -> StoreResult<Option<WorkflowState>>;

    /// Replace the document. Either the whole document is written or none of it.
    fn save(&self, state: &WorkflowState) -> StoreResult<()>;

    /// Exclude other writers for the lifetime of the returned guard.
    fn lock(&self) -> StoreResult<StoreGuard>;
}
