use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("script `{0}` does not exist or is not active")]
    ScriptNotActive(String),
    #[error("tenant `{tenant_id}` is not authorized to run script `{script_id}`")]
    Unauthorized { tenant_id: String, script_id: String },
    #[error("tenant `{0}` has exceeded its execution quota")]
    QuotaExceeded(String),
    #[error("no sandbox capacity available")]
    NoCapacity,
    #[error("security analysis blocked this script: {0}")]
    SecurityBlocked(String),
    #[error("script registry error: {0}")]
    Registry(String),
    #[error("quota limiter error: {0}")]
    Quota(String),
    #[error("sandbox transport error: {0}")]
    SandboxTransport(String),
    #[error("execution `{0}` was not cancelled: sandbox reported it was not running")]
    CancelFailed(String),
    #[error("log store error: {0}")]
    LogStore(#[from] scriptlet_logstore::LogStoreError),
}
