use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use scriptlet_broker::{Broker, ScriptManifest};
use scriptlet_common::DISPATCH_GRACE_MS;
use scriptlet_logstore::{
    ExecutionStatus, FlagSeverity, LogStore, NewExecutionLog, SecurityFlag, TransitionUpdate,
};

use crate::error::OrchestratorError;
use crate::governor::ResourceGovernor;
use crate::registry::{QuotaLimiter, ScriptRegistry, TenantManifestProvider};
use crate::types::{
    Budgets, ExecutionOutcome, ExecutionRequest, SandboxExecuteRequest, SandboxResult, StopRequest, StopResult,
};

/// Admits and runs script executions.
///
/// `admit_and_run` is the six-step pipeline: existence/activity,
/// authorization, quota, resource headroom, security analysis, then
/// dispatch. A request that fails any of the first five steps never reaches
/// the sandbox or the broker at all, but it still gets a log row recording
/// why; only a request that clears every gate gets an execution id, a broker
/// token, and a live log row that moves through `Running`. `cancel` is the
/// one other way a log row reaches a terminal status outside of `finish`.
pub struct Orchestrator {
    registry: Arc<dyn ScriptRegistry>,
    quota: Arc<dyn QuotaLimiter>,
    manifests: Arc<dyn TenantManifestProvider>,
    governor: ResourceGovernor,
    broker: Arc<Broker>,
    log_store: Arc<dyn LogStore>,
    http_client: reqwest::Client,
    sandbox_endpoint: String,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        registry: Arc<dyn ScriptRegistry>,
        quota: Arc<dyn QuotaLimiter>,
        manifests: Arc<dyn TenantManifestProvider>,
        max_concurrent_executions: usize,
        broker: Arc<Broker>,
        log_store: Arc<dyn LogStore>,
        sandbox_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            quota,
            manifests,
            governor: ResourceGovernor::new(max_concurrent_executions),
            broker,
            log_store,
            http_client: reqwest::Client::new(),
            sandbox_endpoint: sandbox_endpoint.into(),
        }
    }

    #[tracing::instrument(skip(self, request), fields(script_id = %request.script_id, tenant_id = %request.tenant_id))]
    pub async fn admit_and_run(
        &self,
        request: ExecutionRequest,
    ) -> Result<ExecutionOutcome, OrchestratorError> {
        let script = match self.registry.lookup(&request.script_id).await? {
            Some(script) if script.active => script,
            _ => {
                let err = OrchestratorError::ScriptNotActive(request.script_id.clone());
                self.reject_before_dispatch(&request, "script_not_active", FlagSeverity::Medium, err.to_string(), vec![])
                    .await?;
                return Err(err);
            }
        };

        if !request.caller.may_execute(&script.tenant_id) {
            let err = OrchestratorError::Unauthorized {
                tenant_id: request.tenant_id.clone(),
                script_id: request.script_id.clone(),
            };
            self.reject_before_dispatch(&request, "unauthorized", FlagSeverity::High, err.to_string(), vec![]).await?;
            return Err(err);
        }

        if let Err(err) = self.quota.check_and_reserve(&request.tenant_id).await {
            self.reject_before_dispatch(&request, "quota_exceeded", FlagSeverity::Low, err.to_string(), vec![]).await?;
            return Err(err);
        }

        let _permit = match self.governor.try_acquire() {
            Ok(permit) => permit,
            Err(err) => {
                self.reject_before_dispatch(&request, "no_capacity", FlagSeverity::Low, err.to_string(), vec![]).await?;
                return Err(err);
            }
        };

        let analysis = scriptlet_security::analyze(&script.source);
        let security_flags = security_flags_from_analysis(&analysis);
        if analysis.has_blocking_issue() {
            let summary = analysis
                .issues
                .iter()
                .filter(|issue| issue.severity == scriptlet_security::Severity::High)
                .map(|issue| issue.kind.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            let err = OrchestratorError::SecurityBlocked(summary);
            self.reject_before_dispatch(&request, "security_blocked", FlagSeverity::High, err.to_string(), security_flags)
                .await?;
            return Err(err);
        }

        let security_score = analysis.score;
        let exec_id = uuid::Uuid::new_v4().to_string();
        let api_token = uuid::Uuid::new_v4().to_string();
        let budgets = request.budgets.unwrap_or_default();
        let manifest = self.manifests.manifest_for(&request.tenant_id).await?;
        let script_manifest = ScriptManifest { capabilities: script.capabilities.clone() };

        self.log_store.create(NewExecutionLog {
            id: exec_id.clone(),
            script_id: request.script_id.clone(),
            tenant_id: request.tenant_id.clone(),
            trigger_kind: request.trigger_kind.clone(),
            created_at: unix_millis(),
            security_flags: vec![],
        })?;

        self.broker.begin_execution(exec_id.clone(), api_token.clone(), manifest, script_manifest).await;
        self.log_store.transition(
            &exec_id,
            ExecutionStatus::Pending,
            TransitionUpdate::Start { started_at: unix_millis() },
        )?;

        let dispatch_result = self
            .dispatch(&script.source, &request.context, budgets, &exec_id, &request.script_id, &request.tenant_id, &api_token)
            .await;
        self.broker.end_execution(&exec_id).await;

        let outcome = self.finish(&exec_id, security_score, security_flags, dispatch_result).await?;
        Ok(outcome)
    }

    /// Records a log row for a request that never reached dispatch: the row is created
    /// in `Pending` and immediately transitioned straight to `Failed`, so it still shows
    /// up in the tenant's execution history even though the sandbox never ran anything.
    /// Every rejection gets its own labelled flag (`kind`/`severity`) on top of whatever
    /// `extra_flags` the caller already has (the static analyzer's own findings, for a
    /// security-blocked rejection).
    async fn reject_before_dispatch(
        &self,
        request: &ExecutionRequest,
        kind: &str,
        severity: FlagSeverity,
        message: String,
        mut extra_flags: Vec<SecurityFlag>,
    ) -> Result<(), OrchestratorError> {
        let exec_id = uuid::Uuid::new_v4().to_string();
        let now = unix_millis();
        extra_flags.push(SecurityFlag {
            severity,
            kind: kind.to_string(),
            message: message.clone(),
            context: serde_json::Value::Null,
            at: now,
        });
        let security_flags = extra_flags;

        self.log_store.create(NewExecutionLog {
            id: exec_id.clone(),
            script_id: request.script_id.clone(),
            tenant_id: request.tenant_id.clone(),
            trigger_kind: request.trigger_kind.clone(),
            created_at: now,
            security_flags: security_flags.clone(),
        })?;
        self.log_store.transition(
            &exec_id,
            ExecutionStatus::Pending,
            TransitionUpdate::Finish {
                status: ExecutionStatus::Failed,
                finished_at: now,
                execution_time_ms: 0,
                memory_used_bytes: 0,
                result: None,
                error: Some(message),
                output_lines: vec![],
                security_flags,
            },
        )?;
        Ok(())
    }

    /// Asks the sandbox executor to stop a running execution. The log only moves to
    /// `Cancelled` if the sandbox acknowledges it actually found and killed something
    /// live; a sandbox that reports nothing running leaves the log alone, since the
    /// execution may already be settling into its own terminal status via `finish`.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, exec_id: &str) -> Result<(), OrchestratorError> {
        let response = self
            .http_client
            .post(format!("{}/stop", self.sandbox_endpoint))
            .json(&StopRequest { exec_id })
            .send()
            .await
            .map_err(|err| OrchestratorError::SandboxTransport(err.to_string()))?;

        let stop_result: StopResult =
            response.json().await.map_err(|err| OrchestratorError::SandboxTransport(err.to_string()))?;

        if !stop_result.stopped {
            return Err(OrchestratorError::CancelFailed(exec_id.to_string()));
        }

        self.log_store.transition(
            exec_id,
            ExecutionStatus::Running,
            TransitionUpdate::Finish {
                status: ExecutionStatus::Cancelled,
                finished_at: unix_millis(),
                execution_time_ms: 0,
                memory_used_bytes: 0,
                result: None,
                error: Some("cancelled by caller request".to_string()),
                output_lines: vec![],
                security_flags: vec![],
            },
        )?;

        Ok(())
    }

    async fn dispatch(
        &self,
        code: &str,
        context: &serde_json::Value,
        budgets: Budgets,
        exec_id: &str,
        script_id: &str,
        tenant_id: &str,
        api_token: &str,
    ) -> Result<SandboxResult, OrchestratorError> {
        let request = SandboxExecuteRequest {
            code,
            context,
            budgets,
            exec_id,
            script_id,
            tenant_id,
            broker_endpoint: &self.sandbox_endpoint,
            broker_token: api_token,
        };
        let grace = Duration::from_millis(budgets.wall_clock_ms + DISPATCH_GRACE_MS);
        let response = tokio::time::timeout(
            grace,
            self.http_client.post(format!("{}/execute", self.sandbox_endpoint)).json(&request).send(),
        )
        .await
        .map_err(|_| OrchestratorError::SandboxTransport("dispatch exceeded its grace period".to_string()))?
        .map_err(|err| OrchestratorError::SandboxTransport(err.to_string()))?;

        response.json::<SandboxResult>().await.map_err(|err| OrchestratorError::SandboxTransport(err.to_string()))
    }

    async fn finish(
        &self,
        exec_id: &str,
        security_score: u8,
        security_flags: Vec<SecurityFlag>,
        dispatch_result: Result<SandboxResult, OrchestratorError>,
    ) -> Result<ExecutionOutcome, OrchestratorError> {
        let finished_at = unix_millis();
        let (status, result, error, execution_time_ms, memory_used_bytes, output_lines) =
            match dispatch_result {
                Ok(sandbox_result) => {
                    let status =
                        if sandbox_result.success { ExecutionStatus::Succeeded } else { ExecutionStatus::Failed };
                    (
                        status,
                        sandbox_result.result,
                        sandbox_result.error,
                        sandbox_result.execution_time_ms,
                        sandbox_result.memory_used_bytes,
                        sandbox_result.output_lines,
                    )
                }
                Err(OrchestratorError::SandboxTransport(message)) if message.contains("grace period") => {
                    (ExecutionStatus::TimedOut, None, Some(message), 0, 0, vec![])
                }
                Err(other) => (ExecutionStatus::Failed, None, Some(other.to_string()), 0, 0, vec![]),
            };

        self.log_store.transition(
            exec_id,
            ExecutionStatus::Running,
            TransitionUpdate::Finish {
                status,
                finished_at,
                execution_time_ms: i64::try_from(execution_time_ms).unwrap_or(i64::MAX),
                memory_used_bytes: i64::try_from(memory_used_bytes).unwrap_or(i64::MAX),
                result: result.clone(),
                error: error.clone(),
                output_lines: output_lines.clone(),
                security_flags,
            },
        )?;

        Ok(ExecutionOutcome {
            exec_id: exec_id.to_string(),
            success: status == ExecutionStatus::Succeeded,
            result,
            error,
            execution_time_ms,
            memory_used_bytes,
            output_lines,
            security_score,
        })
    }
}

fn unix_millis() -> i64 {
    i64::try_from(SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis())
        .unwrap_or(i64::MAX)
}

/// Converts a security analysis's findings into the log store's own flag shape, so a
/// log row carries what the analyzer found regardless of whether it blocked dispatch.
fn security_flags_from_analysis(analysis: &scriptlet_security::Analysis) -> Vec<SecurityFlag> {
    let at = unix_millis();
    analysis
        .issues
        .iter()
        .map(|issue| SecurityFlag {
            severity: match issue.severity {
                scriptlet_security::Severity::Low => FlagSeverity::Low,
                scriptlet_security::Severity::Medium => FlagSeverity::Medium,
                scriptlet_security::Severity::High => FlagSeverity::High,
            },
            kind: issue.kind.clone(),
            message: issue.message.clone(),
            context: issue
                .location
                .map(|offset| serde_json::json!({ "offset": offset }))
                .unwrap_or(serde_json::Value::Null),
            at,
        })
        .collect()
}
