use serde::{Deserialize, Serialize};

/// A role a caller may hold when requesting an execution. Distinct from a
/// tenant's own capability manifest (enforced by the broker, scoped to what
/// a *script* may reach): this scopes who may ask the orchestrator to run a
/// script at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerRole {
    /// May run scripts belonging to its own tenant only.
    TenantOperator,
    /// May run any tenant's scripts. Held by the platform's own internal
    /// callers (the trigger router's scheduler, administrative tooling),
    /// never by a tenant-facing credential.
    PlatformAdmin,
}

/// Identifies who is asking the orchestrator to run a script. Authorization
/// in [`crate::Orchestrator::admit_and_run`] is keyed off this, not off the
/// request's `tenant_id` alone — a caller scoped to one tenant can never run
/// another tenant's script, regardless of what `tenant_id` it names.
#[derive(Debug, Clone)]
pub struct Caller {
    pub caller_id: String,
    pub tenant_id: String,
    pub roles: Vec<CallerRole>,
}

impl Caller {
    /// Whether this caller may run a script owned by `script_tenant_id`.
    #[must_use]
    pub fn may_execute(&self, script_tenant_id: &str) -> bool {
        self.roles.contains(&CallerRole::PlatformAdmin) || self.tenant_id == script_tenant_id
    }
}

/// Resource budgets enforced by the sandbox executor for a single run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Budgets {
    pub wall_clock_ms: u64,
    pub cpu_time_ms: u64,
    pub memory_bytes: usize,
}

impl Default for Budgets {
    fn default() -> Self {
        Self { wall_clock_ms: 5_000, cpu_time_ms: 5_000, memory_bytes: 64 * 1024 * 1024 }
    }
}

/// A request to run a tenant's script, arriving from the trigger router or
/// an operator-facing API.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub script_id: String,
    pub tenant_id: String,
    pub trigger_kind: String,
    pub context: serde_json::Value,
    pub budgets: Option<Budgets>,
    pub caller: Caller,
}

/// What the orchestrator knows about a script independent of any one
/// execution request. Provided by a [`crate::registry::ScriptRegistry`]
/// implementation, which owns however the platform actually stores scripts.
#[derive(Debug, Clone)]
pub struct ScriptRecord {
    pub script_id: String,
    pub tenant_id: String,
    pub source: String,
    pub active: bool,
    /// Capabilities this script was configured to use, passed to the broker
    /// alongside the tenant's own manifest so a script is never handed more
    /// than it was declared to need.
    pub capabilities: Vec<scriptlet_broker::Capability>,
}

/// The terminal outcome of an admitted execution.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionOutcome {
    pub exec_id: String,
    pub success: bool,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub execution_time_ms: u64,
    pub memory_used_bytes: usize,
    pub output_lines: Vec<String>,
    pub security_score: u8,
}

/// Request body sent to the sandbox executor's `/execute` endpoint.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct SandboxExecuteRequest<'a> {
    pub code: &'a str,
    pub context: &'a serde_json::Value,
    pub budgets: Budgets,
    pub exec_id: &'a str,
    pub script_id: &'a str,
    pub tenant_id: &'a str,
    pub broker_endpoint: &'a str,
    pub broker_token: &'a str,
}

/// Response body from the sandbox executor's `/execute` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SandboxResult {
    pub success: bool,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub execution_time_ms: u64,
    pub memory_used_bytes: usize,
    pub output_lines: Vec<String>,
}

/// Request body sent to the sandbox executor's `/stop` endpoint.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct StopRequest<'a> {
    pub exec_id: &'a str,
}

/// Response body from the sandbox executor's `/stop` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct StopResult {
    pub success: bool,
    pub stopped: bool,
    pub execution_id: String,
}
