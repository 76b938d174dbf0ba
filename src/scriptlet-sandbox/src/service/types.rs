use serde::{Deserialize, Serialize};

/// Resource budgets for a single execution, mirroring the orchestrator's own
/// `Budgets` type on the wire.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct Budgets {
    /// Maximum wall-clock duration the handler may run for, in milliseconds.
    pub wall_clock_ms: u64,
    /// Maximum CPU time the handler may consume, in milliseconds. Only enforced when
    /// this crate is built with the `monitor-cpu-time` feature.
    pub cpu_time_ms: u64,
    /// Maximum guest memory the handler may use, in bytes.
    pub memory_bytes: usize,
}

/// Body of a `POST /execute` request.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteRequest {
    /// The script source to run as the sandbox's single handler.
    pub code: String,
    /// The event/trigger payload passed to the handler.
    pub context: serde_json::Value,
    /// Resource limits to enforce while the handler runs.
    pub budgets: Budgets,
    /// The execution id the capability broker expects on every callback.
    pub exec_id: String,
    /// The id of the script being run, returned to it verbatim by `api.getScriptInfo()`.
    pub script_id: String,
    /// The owning tenant's id, returned to the script as `client_id` by `api.getScriptInfo()`.
    pub tenant_id: String,
    /// Present for wire compatibility with a networked capability broker; this
    /// implementation brokers capability calls in-process and does not dial it.
    #[serde(default)]
    pub broker_endpoint: String,
    /// The token the capability broker expects on every callback from this execution.
    pub broker_token: String,
}

/// Body returned from `POST /execute`.
#[derive(Debug, Clone, Serialize)]
pub struct ExecuteResponse {
    /// Whether the handler returned normally without being terminated or erroring.
    pub success: bool,
    /// The handler's return value, if it succeeded.
    pub result: Option<serde_json::Value>,
    /// A human-readable failure reason, if it did not succeed.
    pub error: Option<String>,
    /// Wall-clock time the handler ran for, in milliseconds.
    pub execution_time_ms: u64,
    /// A process-RSS sample taken just after the handler returns, in bytes. Only
    /// available on Linux with the `monitor-memory` feature enabled (`0` otherwise) —
    /// an overestimate of the one guest's actual footprint, since the host process's
    /// RSS is shared with every other warm sandbox, but the same conservative reading
    /// the memory monitor enforces the hard limit against.
    pub memory_used_bytes: usize,
    /// Lines the handler wrote via `console.log` or similar, in order.
    pub output_lines: Vec<String>,
}

/// Body of a `POST /stop` request.
#[derive(Debug, Clone, Deserialize)]
pub struct StopRequest {
    /// The execution id to abort.
    pub exec_id: String,
}

/// Body returned from `POST /stop`.
#[derive(Debug, Clone, Serialize)]
pub struct StopResponse {
    /// Whether the request was handled without error. Always `true`: stopping an
    /// unknown or already-finished execution is not itself a failure.
    pub success: bool,
    /// Whether a live execution was found and killed.
    pub stopped: bool,
    /// The execution id the request asked to stop, echoed back for correlation.
    pub execution_id: String,
}

/// Body of a `POST /validate` request.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidateRequest {
    /// The script source to check.
    pub code: String,
}

/// Body returned from `POST /validate`.
#[derive(Debug, Clone, Serialize)]
pub struct ValidateResponse {
    /// Whether the script is syntactically valid.
    pub valid: bool,
    /// The syntax error found, if any.
    pub error: Option<String>,
}

/// Body returned from `GET /status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    /// Number of executions currently running in this process.
    pub active_count: usize,
    /// Execution ids currently running in this process.
    pub exec_ids: Vec<String>,
}
