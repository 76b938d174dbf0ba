/// How often a script's schedule trigger fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frequency {
    Minutely,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    /// A standard 5-field cron expression (`minute hour day-of-month month day-of-week`).
    Cron(String),
}

#[derive(Debug, Clone)]
pub struct ScheduleSpec {
    pub enabled: bool,
    pub frequency: Frequency,
    /// Epoch milliseconds of the last tick this schedule dispatched on, if any.
    pub last_execution_ms: Option<i64>,
}

/// One entry in a script's `triggers.api_endpoints` list. `method` may be `"*"` to match
/// any HTTP method.
#[derive(Debug, Clone)]
pub struct ApiEndpointBinding {
    pub endpoint: String,
    pub method: String,
}

/// Identifies who triggered a non-scheduled execution. When present, it scopes matching
/// to that tenant alone; when absent, every active binding is a candidate and the
/// matched script's own tenant is used.
#[derive(Debug, Clone)]
pub struct Caller {
    pub tenant_id: String,
    pub caller_id: Option<String>,
}

/// Everything the router needs to know about a script's trigger bindings. Sourced from
/// whatever holds the platform's Script records; the router has no opinion on storage.
#[derive(Debug, Clone)]
pub struct ScriptBindings {
    pub script_id: String,
    pub tenant_id: String,
    pub active: bool,
    pub events: Vec<String>,
    pub webhooks: Vec<String>,
    pub api_endpoints: Vec<ApiEndpointBinding>,
    pub schedule: Option<ScheduleSpec>,
}
