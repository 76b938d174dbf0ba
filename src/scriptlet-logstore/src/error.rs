use thiserror::Error;

/// Errors returned by [`crate::LogStore`] implementations.
#[derive(Debug, Error)]
pub enum LogStoreError {
    /// The underlying database rejected the operation or could not be reached.
    #[error("log store db error: {0}")]
    Db(String),
    /// No row exists for the given id.
    #[error("execution log {0} not found")]
    NotFound(String),
    /// The requested transition does not match the row's current status, or
    /// the row is already terminal. Carries the status actually observed so
    /// the caller can decide whether to retry or give up.
    #[error("cas mismatch on execution log {id}: expected {expected}, found {actual}")]
    CasMismatch {
        id: String,
        expected: String,
        actual: String,
    },
    /// Caller-provided data failed validation before it ever reached SQL.
    #[error("invalid execution log data: {0}")]
    Invalid(String),
}
