//! Matches events, webhooks, API hits, and schedule ticks against active scripts and
//! fans each match out to the orchestrator as an independent execution request.

mod cron;
mod error;
mod glob;
mod registry;
mod router;
mod types;

pub use cron::CronSchedule;
pub use error::RouterError;
pub use registry::{fixtures, TriggerRegistry};
pub use router::Router;
pub use types::{ApiEndpointBinding, Caller, Frequency, ScheduleSpec, ScriptBindings};
