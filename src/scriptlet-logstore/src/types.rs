use serde::{Deserialize, Serialize};

/// Lifecycle status of a single script execution.
///
/// `Pending` and `Running` are transient; the other four are terminal and,
/// once reached, the row backing them is never mutated again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    TimedOut,
    /// Stopped on operator or caller request before it reached a natural
    /// outcome, rather than failing on its own.
    Cancelled,
}

impl ExecutionStatus {
    /// Terminal statuses never accept a further transition.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::TimedOut | Self::Cancelled)
    }

    pub(crate) const fn as_db_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
        }
    }

    pub(crate) fn from_db_str(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            "timed_out" => Some(Self::TimedOut),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Severity of a single static-analysis finding attached to an execution.
/// Mirrors `scriptlet_security::Severity`'s three levels without taking a
/// dependency on that crate, since a log row must remain readable by any
/// consumer of the store regardless of whether security analysis ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagSeverity {
    Low,
    Medium,
    High,
}

/// A single static-analysis finding recorded against an execution, carried
/// over from `scriptlet_security::Analysis` at admission time. `at` is a
/// millisecond Unix timestamp, matching every other timestamp this crate
/// stores; `context` is whatever structured detail the analyzer attached
/// (e.g. the source offset of the flagged construct), opaque to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityFlag {
    pub severity: FlagSeverity,
    pub kind: String,
    pub message: String,
    #[serde(default)]
    pub context: serde_json::Value,
    pub at: i64,
}

/// A single execution log row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLog {
    pub id: String,
    pub script_id: String,
    pub tenant_id: String,
    pub trigger_kind: String,
    pub status: ExecutionStatus,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub execution_time_ms: Option<i64>,
    pub memory_used_bytes: Option<i64>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub output_lines: Vec<String>,
    pub security_flags: Vec<SecurityFlag>,
}

/// Fields required to create a new execution log row. The row starts in
/// `Pending` status; `created_at` is assigned by the caller so that the
/// store stays free of wall-clock reads (and is trivially testable).
/// `security_flags` is usually empty at creation — it is populated here only
/// when the row is being created for an execution that was rejected by
/// static analysis before it ever ran.
#[derive(Debug, Clone)]
pub struct NewExecutionLog {
    pub id: String,
    pub script_id: String,
    pub tenant_id: String,
    pub trigger_kind: String,
    pub created_at: i64,
    pub security_flags: Vec<SecurityFlag>,
}

/// The fields a transition may update, keyed by which transition is being
/// made. `Start` moves `pending -> running`; `Finish` moves `running` to one
/// of the four terminal statuses.
#[derive(Debug, Clone)]
pub enum TransitionUpdate {
    Start {
        started_at: i64,
    },
    Finish {
        status: ExecutionStatus,
        finished_at: i64,
        execution_time_ms: i64,
        memory_used_bytes: i64,
        result: Option<serde_json::Value>,
        error: Option<String>,
        output_lines: Vec<String>,
        /// Replaces the row's `security_flags` with the full set recorded
        /// for the completed execution. Most finishes pass through whatever
        /// `NewExecutionLog` already set; a static-analysis rejection that
        /// never started sets them here instead, against a row that has no
        /// prior flags to replace.
        security_flags: Vec<SecurityFlag>,
    },
}

impl TransitionUpdate {
    pub(crate) const fn target_status(&self) -> ExecutionStatus {
        match self {
            Self::Start { .. } => ExecutionStatus::Running,
            Self::Finish { status, .. } => *status,
        }
    }
}

/// A half-open `[since, until)` time range over `created_at`, used by the
/// tenant read path and aggregations.
#[derive(Debug, Clone, Copy)]
pub struct TimeRange {
    pub since: i64,
    pub until: i64,
}

/// Execution counts for a tenant within a time range, broken down by status.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TenantExecutionStats {
    pub total: u64,
    pub pending: u64,
    pub running: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub cancelled: u64,
    pub avg_execution_time_ms: Option<f64>,
}
