use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::OrchestratorError;

/// Bounds the number of sandbox executions running at once. This is the
/// "resource headroom" admission check: once the cap is reached, further
/// requests are denied immediately rather than queued, so a burst of
/// requests can't build up unbounded backlog against a fixed pool of
/// sandboxes.
pub struct ResourceGovernor {
    capacity: Arc<Semaphore>,
}

/// Held for the duration of one execution; dropping it returns the slot to
/// the pool.
pub struct ResourcePermit(#[allow(dead_code)] OwnedSemaphorePermit);

impl ResourceGovernor {
    #[must_use]
    pub fn new(max_concurrent_executions: usize) -> Self {
        Self { capacity: Arc::new(Semaphore::new(max_concurrent_executions)) }
    }

    pub fn try_acquire(&self) -> Result<ResourcePermit, OrchestratorError> {
        Arc::clone(&self.capacity)
            .try_acquire_owned()
            .map(ResourcePermit)
            .map_err(|_| OrchestratorError::NoCapacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denies_once_capacity_is_exhausted() {
        let governor = ResourceGovernor::new(1);
        let _first = governor.try_acquire().unwrap();
        assert!(matches!(governor.try_acquire(), Err(OrchestratorError::NoCapacity)));
    }

    #[test]
    fn releases_capacity_when_permit_drops() {
        let governor = ResourceGovernor::new(1);
        {
            let _permit = governor.try_acquire().unwrap();
        }
        assert!(governor.try_acquire().is_ok());
    }
}
