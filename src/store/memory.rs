use std::sync::Mutex;

use super::{StateStore, StoreError, StoreGuard, StoreResult};
use crate::workflow::WorkflowState;

/// Process-local store, used by tests and embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    state: Mutex<Option<WorkflowState>>,
    saves: Mutex<u64>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: WorkflowState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
            saves: Mutex::new(0),
        }
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> u64 {
        self.saves.lock().map(|count| *count).unwrap_or(0)
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> StoreResult<Option<WorkflowState>> {
        let state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(state.clone())
    }

    fn save(&self, state: &WorkflowState) -> StoreResult<()> {
        let mut slot = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        *slot = Some(state.clone());
        let mut saves = self.saves.lock().map_err(|_| StoreError::Poisoned)?;
        *saves += 1;
        Ok(())
    }

    fn lock(&self) -> StoreResult<StoreGuard> {
        Ok(StoreGuard::unlocked())
    }
}
