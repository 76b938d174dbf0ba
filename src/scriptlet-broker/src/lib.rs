//! The host-side capability broker: the only path by which a running script
//! reaches a database, the network, or the platform's event bus.
//!
//! Every call arrives as a [`CallbackRequest`] over the guest's
//! `CallHostJsFunction` bridge, is authorized against a live-execution
//! token, then checked against the calling tenant's [`TenantManifest`]
//! before it is allowed through. `utils.*` calls never reach this crate at
//! all — they're pure helpers implemented sandbox-side.

mod broker;
mod db;
mod error;
mod events;
mod http;
mod manifest;
mod registry;
mod types;

pub use broker::Broker;
pub use db::DbExecutor;
pub use error::BrokerError;
pub use events::EventSink;
pub use manifest::{ScriptManifest, TenantManifest, ALLOWED_SCRIPT_EVENT_PREFIX, ALWAYS_DENIED_TABLES, FORBIDDEN_EVENT_PREFIXES};
pub use registry::{CallCounters, CallCountersSnapshot};
pub use types::{Capability, CallbackRequest, DbOp, DbRequest, EventDispatch, HttpRequest};
