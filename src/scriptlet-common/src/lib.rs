#![no_std]
extern crate alloc;

//! Constants shared between the host (`scriptlet-sandbox`, `scriptlet-broker`) and the
//! guest (`scriptlet-runtime`) so that the two sides never drift on a magic number or a
//! module name.

/// Maximum source size accepted for a script, in bytes.
pub const MAX_SCRIPT_SOURCE_BYTES: usize = 64 * 1024;

/// Maximum number of bytes the capability broker will accept for a single call's
/// JSON-encoded parameters.
pub const MAX_BROKER_PARAMS_BYTES: usize = 256 * 1024;

/// Maximum number of bytes a single `api.http.*` response body may contain before it is
/// truncated by the broker.
pub const MAX_HTTP_RESPONSE_BYTES: usize = 2 * 1024 * 1024;

/// Maximum number of rows a `api.database.query`/`select` call may return.
pub const MAX_QUERY_RESULTS: usize = 1_000;

/// Name of the native module exposing the brokered capability surface to scripts.
pub const API_MODULE_NAME: &str = "api";

/// Names of the four brokered capability surfaces, as used in both the `api.*` JS
/// bindings and the `BrokerRequest` closed sum on the host.
pub mod capability {
    pub const DATABASE: &str = "database";
    pub const HTTP: &str = "http";
    pub const EVENTS: &str = "events";
    pub const UTILS: &str = "utils";
    pub const LOG: &str = "log";
}

/// The single function name every compiled handler is registered and invoked under.
pub const HANDLER_FUNCTION_NAME: &str = "handler";

/// Grace period added on top of a script's configured time limit before the orchestrator
/// gives up waiting on the sandbox and reports a transport failure.
pub const DISPATCH_GRACE_MS: u64 = 5_000;
