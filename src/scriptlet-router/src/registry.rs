use async_trait::async_trait;

use crate::error::RouterError;
use crate::types::ScriptBindings;

/// Supplies the trigger bindings the router matches against, and lets it claim a
/// schedule tick with a compare-and-swap so two router instances (or two overlapping
/// ticks) never dispatch the same scheduled run twice.
#[async_trait]
pub trait TriggerRegistry: Send + Sync {
    async fn active_bindings(&self) -> Result<Vec<ScriptBindings>, RouterError>;

    /// Atomically moves a script's `schedule.last_execution` forward to `tick_ms`,
    /// succeeding only if the stored value still equals `expected_prev_ms`. Returns
    /// `false` (not an error) on a lost race.
    async fn try_claim_schedule_tick(
        &self,
        script_id: &str,
        expected_prev_ms: Option<i64>,
        tick_ms: i64,
    ) -> Result<bool, RouterError>;
}

/// A fixed, in-memory [`TriggerRegistry`] useful for the CLI and for tests.
pub mod fixtures {
    use std::sync::Mutex;

    use super::{async_trait, RouterError, ScriptBindings, TriggerRegistry};

    #[derive(Default)]
    pub struct StaticTriggerRegistry {
        bindings: Mutex<Vec<ScriptBindings>>,
    }

    impl StaticTriggerRegistry {
        #[must_use]
        pub fn new(bindings: Vec<ScriptBindings>) -> Self {
            Self { bindings: Mutex::new(bindings) }
        }
    }

    #[async_trait]
    impl TriggerRegistry for StaticTriggerRegistry {
        async fn active_bindings(&self) -> Result<Vec<ScriptBindings>, RouterError> {
            Ok(self.bindings.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone())
        }

        async fn try_claim_schedule_tick(
            &self,
            script_id: &str,
            expected_prev_ms: Option<i64>,
            tick_ms: i64,
        ) -> Result<bool, RouterError> {
            let mut bindings = self.bindings.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let Some(binding) = bindings.iter_mut().find(|b| b.script_id == script_id) else {
                return Ok(false);
            };
            let Some(schedule) = binding.schedule.as_mut() else {
                return Ok(false);
            };
            if schedule.last_execution_ms != expected_prev_ms {
                return Ok(false);
            }
            schedule.last_execution_ms = Some(tick_ms);
            Ok(true)
        }
    }
}
