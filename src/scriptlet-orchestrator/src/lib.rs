//! Admission and dispatch for script executions.
//!
//! [`Orchestrator::admit_and_run`] is the platform's single front door: every
//! execution, whatever triggered it, passes through existence/activity,
//! authorization, quota, resource-headroom, and security-analysis checks
//! before a sandbox is ever asked to run anything.

mod error;
mod governor;
mod orchestrator;
mod quota;
mod registry;
mod types;

pub use error::OrchestratorError;
pub use governor::{ResourceGovernor, ResourcePermit};
pub use orchestrator::Orchestrator;
pub use quota::WindowedQuota;
pub use registry::{fixtures, QuotaLimiter, ScriptRegistry, TenantManifestProvider};
pub use types::{Budgets, Caller, CallerRole, ExecutionOutcome, ExecutionRequest, ScriptRecord};
