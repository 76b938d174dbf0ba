use thiserror::Error;

/// Errors surfaced by the capability broker.
///
/// A `BrokerError` never propagates as a Rust panic into the sandbox: the
/// sandbox executor turns it into a thrown JS error on the calling script's
/// side, and the orchestrator records it as a security flag. A capability
/// violation is a fact about the script's behavior, not a host-side bug.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("execution {0} is not live, or the supplied token does not match")]
    Unauthorized(String),
    #[error("capability `{0}` is not granted to this tenant")]
    CapabilityDenied(String),
    #[error("table `{0}` cannot be accessed through the capability broker")]
    TableDenied(String),
    #[error("write operations are disabled for this tenant")]
    WriteDisabled,
    #[error("unsupported URL scheme `{0}`")]
    SchemeNotAllowed(String),
    #[error("host `{0}` is not allowed by this tenant's policy")]
    HostNotAllowed(String),
    #[error("host `{0}` resolves to a private or link-local address")]
    PrivateNetworkDenied(String),
    #[error("event `{0}` is not allowed by this tenant's policy")]
    EventNotAllowed(String),
    #[error("payload exceeds the {max_bytes} byte limit ({actual_bytes} bytes)")]
    PayloadTooLarge { max_bytes: usize, actual_bytes: usize },
    #[error("invalid broker request: {0}")]
    Invalid(String),
    #[error("database error: {0}")]
    Db(String),
    #[error("http error: {0}")]
    Http(String),
}
