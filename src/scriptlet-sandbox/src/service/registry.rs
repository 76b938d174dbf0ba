use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::InterruptHandle;

/// Tracks the execution ids currently running in this process, and the interrupt
/// handle needed to abort each one. Backs `/stop`, `/status`, and `/health`.
pub struct ActiveExecutions {
    handles: Mutex<HashMap<String, Arc<dyn InterruptHandle>>>,
    capacity: usize,
}

impl ActiveExecutions {
    /// `capacity` is the number of concurrent executions this process admits before
    /// `/health` reports itself busy; it mirrors the sandbox executor's own
    /// configured concurrency limit rather than the warm-pool size, since a pool miss
    /// still boots a fresh sandbox rather than rejecting the execution outright.
    pub fn new(capacity: usize) -> Self {
        Self { handles: Mutex::new(HashMap::new()), capacity }
    }

    pub fn insert(&self, exec_id: String, handle: Arc<dyn InterruptHandle>) {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner).insert(exec_id, handle);
    }

    pub fn remove(&self, exec_id: &str) {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner).remove(exec_id);
    }

    /// Aborts the named execution if it is live. Idempotent: stopping an id that
    /// isn't running (already finished, or never started here) is not an error.
    pub fn abort(&self, exec_id: &str) -> bool {
        let handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        match handles.get(exec_id) {
            Some(handle) => {
                handle.kill();
                true
            }
            None => false,
        }
    }

    pub fn count(&self) -> usize {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn ids(&self) -> Vec<String> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner).keys().cloned().collect()
    }

    /// Whether this process has headroom for another execution, given the capacity
    /// it was configured with.
    pub fn accepting_work(&self) -> bool {
        self.count() < self.capacity
    }
}
