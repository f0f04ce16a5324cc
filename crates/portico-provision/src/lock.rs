//! Per-workspace exclusion for mutating operations.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

/// Set of workspace ids with an operation in flight. Acquisition never
/// waits: a held id is reported to the caller instead.
#[derive(Default)]
pub struct LockTable {
    held: Mutex<HashSet<String>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self, workspace_id: &str) -> Option<WorkspaceLock<'_>> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if !held.insert(workspace_id.to_string()) {
            return None;
        }
        Some(WorkspaceLock {
            table: self,
            workspace_id: workspace_id.to_string(),
        })
    }

    pub fn is_held(&self, workspace_id: &str) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(workspace_id)
    }
}

/// Released on drop.
#[derive(Debug)]
pub struct WorkspaceLock<'a> {
    table: &'a LockTable,
    workspace_id: String,
}

impl Drop for WorkspaceLock<'_> {
    fn drop(&mut self) {
        self.table
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.workspace_id);
    }
}

impl std::fmt::Debug for LockTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockTable").finish_non_exhaustive()
    }
}
