use std::sync::Arc;

use chrono::{DateTime, Datelike, Timelike, Utc};
use scriptlet_orchestrator::{self, ExecutionRequest, Orchestrator};
use tracing::warn;

use crate::cron::CronSchedule;
use crate::error::RouterError;
use crate::registry::TriggerRegistry;
use crate::types::{Caller, Frequency, ScriptBindings};

const MS_PER_MINUTE: i64 = 60_000;
const MS_PER_HOUR: i64 = 60 * MS_PER_MINUTE;
const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;

/// Matches incoming triggers against active scripts and fans each match out to the
/// orchestrator. Every dispatch is fire-and-forget: the router reports how many
/// executions it started, never their outcomes.
pub struct Router {
    registry: Arc<dyn TriggerRegistry>,
    orchestrator: Arc<Orchestrator>,
}

impl Router {
    #[must_use]
    pub fn new(registry: Arc<dyn TriggerRegistry>, orchestrator: Arc<Orchestrator>) -> Self {
        Self { registry, orchestrator }
    }

    pub async fn trigger_event(
        &self,
        name: &str,
        payload: serde_json::Value,
        caller: Option<Caller>,
    ) -> Result<usize, RouterError> {
        let bindings = self.scoped_bindings(caller.as_ref()).await?;
        let matched = bindings
            .into_iter()
            .filter(|b| b.events.iter().any(|pattern| crate::glob::glob_match(pattern, name)));
        Ok(self.dispatch_all(matched, "event", payload, caller))
    }

    pub async fn trigger_webhook(
        &self,
        webhook_name: &str,
        payload: serde_json::Value,
        caller: Option<Caller>,
    ) -> Result<usize, RouterError> {
        let bindings = self.scoped_bindings(caller.as_ref()).await?;
        let matched = bindings.into_iter().filter(|b| b.webhooks.iter().any(|w| w == webhook_name));
        Ok(self.dispatch_all(matched, "webhook", payload, caller))
    }

    pub async fn trigger_api(
        &self,
        endpoint: &str,
        method: &str,
        data: serde_json::Value,
        caller: Option<Caller>,
    ) -> Result<usize, RouterError> {
        let bindings = self.scoped_bindings(caller.as_ref()).await?;
        let matched = bindings.into_iter().filter(|b| {
            b.api_endpoints.iter().any(|bound| bound.endpoint == endpoint && (bound.method == "*" || bound.method == method))
        });
        Ok(self.dispatch_all(matched, "api", data, caller))
    }

    /// Runs one schedule tick. Call at least once a minute; scripts whose frequency has
    /// not yet elapsed since their last execution are left alone.
    pub async fn trigger_schedule(&self, now: DateTime<Utc>) -> Result<usize, RouterError> {
        let bindings = self.registry.active_bindings().await?;
        let now_ms = now.timestamp_millis();
        let mut dispatched = 0;
        for binding in bindings {
            if !binding.active {
                continue;
            }
            let Some(schedule) = binding.schedule.as_ref().filter(|s| s.enabled) else {
                continue;
            };
            let due = match &schedule.frequency {
                Frequency::Minutely => is_due_after(schedule.last_execution_ms, now_ms, MS_PER_MINUTE),
                Frequency::Hourly => is_due_after(schedule.last_execution_ms, now_ms, MS_PER_HOUR),
                Frequency::Daily => is_due_after(schedule.last_execution_ms, now_ms, MS_PER_DAY),
                Frequency::Weekly => is_due_after(schedule.last_execution_ms, now_ms, 7 * MS_PER_DAY),
                Frequency::Monthly => is_due_after(schedule.last_execution_ms, now_ms, 30 * MS_PER_DAY),
                Frequency::Cron(expr) => match CronSchedule::parse(expr) {
                    Ok(cron) => cron.is_due(
                        now.minute(),
                        now.hour(),
                        now.day(),
                        now.month(),
                        now.weekday().num_days_from_sunday(),
                    ),
                    Err(err) => {
                        warn!(script_id = %binding.script_id, error = %err, "skipping schedule with unparsable cron expression");
                        continue;
                    }
                },
            };
            if !due {
                continue;
            }
            match self.registry.try_claim_schedule_tick(&binding.script_id, schedule.last_execution_ms, now_ms).await {
                Ok(true) => {
                    self.spawn_execution(ExecutionRequest {
                        script_id: binding.script_id.clone(),
                        tenant_id: binding.tenant_id.clone(),
                        trigger_kind: "scheduled".to_string(),
                        context: serde_json::json!({}),
                        budgets: None,
                        caller: platform_caller("scheduler", &binding.tenant_id),
                    });
                    dispatched += 1;
                }
                Ok(false) => {}
                Err(err) => warn!(script_id = %binding.script_id, error = %err, "failed to claim schedule tick"),
            }
        }
        Ok(dispatched)
    }

    async fn scoped_bindings(&self, caller: Option<&Caller>) -> Result<Vec<ScriptBindings>, RouterError> {
        let bindings = self.registry.active_bindings().await?;
        Ok(bindings
            .into_iter()
            .filter(|b| b.active)
            .filter(|b| caller.is_none_or(|caller| caller.tenant_id == b.tenant_id))
            .collect())
    }

    fn dispatch_all(
        &self,
        matched: impl Iterator<Item = ScriptBindings>,
        trigger_kind: &str,
        payload: serde_json::Value,
        caller: Option<Caller>,
    ) -> usize {
        let mut count = 0;
        for binding in matched {
            let context = build_context(&payload, caller.as_ref());
            let exec_caller = orchestrator_caller(&binding.tenant_id, caller.as_ref());
            self.spawn_execution(ExecutionRequest {
                script_id: binding.script_id,
                tenant_id: binding.tenant_id,
                trigger_kind: trigger_kind.to_string(),
                context,
                budgets: None,
                caller: exec_caller,
            });
            count += 1;
        }
        count
    }

    fn spawn_execution(&self, request: ExecutionRequest) {
        let orchestrator = Arc::clone(&self.orchestrator);
        let script_id = request.script_id.clone();
        tokio::spawn(async move {
            if let Err(err) = orchestrator.admit_and_run(request).await {
                warn!(%script_id, error = %err, "triggered execution did not complete");
            }
        });
    }
}

fn is_due_after(last_execution_ms: Option<i64>, now_ms: i64, period_ms: i64) -> bool {
    match last_execution_ms {
        None => true,
        Some(last) => now_ms.saturating_sub(last) >= period_ms,
    }
}

fn build_context(payload: &serde_json::Value, caller: Option<&Caller>) -> serde_json::Value {
    let mut context = serde_json::json!({ "payload": payload });
    if let Some(caller) = caller {
        context["caller_id"] = serde_json::Value::from(caller.caller_id.clone());
    }
    context
}

/// Builds the orchestrator-facing caller for a non-scheduled trigger. A caller scoped to
/// one tenant (by [`scoped_bindings`]'s filter) stays scoped here too; an unscoped trigger
/// (no caller at all) already had every tenant's bindings as candidates, so it is treated
/// as platform-internal rather than narrowed to the one binding being dispatched.
fn orchestrator_caller(binding_tenant_id: &str, caller: Option<&Caller>) -> scriptlet_orchestrator::Caller {
    match caller {
        Some(caller) => scriptlet_orchestrator::Caller {
            caller_id: caller.caller_id.clone().unwrap_or_else(|| "router".to_string()),
            tenant_id: caller.tenant_id.clone(),
            roles: vec![scriptlet_orchestrator::CallerRole::TenantOperator],
        },
        None => platform_caller("router", binding_tenant_id),
    }
}

/// The caller identity used for the router's own internal dispatches (schedule ticks, and
/// unscoped event/webhook/api triggers) — never tenant-facing, so it may run any tenant's
/// script; `tenant_id` is still set to the script's own tenant for the request's record.
fn platform_caller(caller_id: &str, tenant_id: &str) -> scriptlet_orchestrator::Caller {
    scriptlet_orchestrator::Caller {
        caller_id: caller_id.to_string(),
        tenant_id: tenant_id.to_string(),
        roles: vec![scriptlet_orchestrator::CallerRole::PlatformAdmin],
    }
}
