//! Durable storage for script execution lifecycles.
//!
//! An execution log row is created once, in `pending` status, and moves
//! forward either through `running` to a terminal status
//! (`succeeded`/`failed`/`timed_out`/`cancelled`), or directly from `pending`
//! to a terminal status when admission itself rejects the execution before
//! it ever starts. Every transition is a compare-and-swap against the row's
//! current status: the caller states what it expects the prior status to
//! be, and the store rejects the transition if that no longer holds.
//! Terminal rows never accept another transition, by construction.

mod error;
mod store;
mod types;

pub use error::LogStoreError;
pub use store::SqliteLogStore;
pub use types::{
    ExecutionLog, ExecutionStatus, FlagSeverity, NewExecutionLog, SecurityFlag,
    TenantExecutionStats, TimeRange, TransitionUpdate,
};

/// Durable store for execution log rows.
///
/// Implementations must make `transition` a true compare-and-swap: under
/// concurrent callers racing the same id, at most one `Start` may land on a
/// `pending` row and at most one `Finish` may land on a `running` row.
pub trait LogStore: Send + Sync {
    /// Creates a new row in `pending` status. Fails if `new.id` already exists.
    fn create(&self, new: NewExecutionLog) -> Result<(), LogStoreError>;

    /// Applies a lifecycle transition, failing unless the row's current
    /// status equals `expected_prev_status` and the transition shape is legal
    /// (`pending -> running` via [`TransitionUpdate::Start`], or
    /// `running -> {succeeded, failed, timed_out}` via
    /// [`TransitionUpdate::Finish`]).
    fn transition(
        &self,
        id: &str,
        expected_prev_status: ExecutionStatus,
        update: TransitionUpdate,
    ) -> Result<(), LogStoreError>;

    /// Looks up a single row by id.
    fn get(&self, id: &str) -> Result<Option<ExecutionLog>, LogStoreError>;

    /// Lists the most recent executions of a script, newest first.
    fn list_by_script(&self, script_id: &str, limit: u32) -> Result<Vec<ExecutionLog>, LogStoreError>;

    /// Lists a tenant's executions within a time range, newest first.
    fn list_by_tenant(
        &self,
        tenant_id: &str,
        range: TimeRange,
    ) -> Result<Vec<ExecutionLog>, LogStoreError>;

    /// Aggregates a tenant's executions within a time range by status.
    fn aggregate_by_tenant(
        &self,
        tenant_id: &str,
        range: TimeRange,
    ) -> Result<TenantExecutionStats, LogStoreError>;
}
