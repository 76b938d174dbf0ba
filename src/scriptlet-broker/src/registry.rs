use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::BrokerError;
use crate::manifest::{ScriptManifest, TenantManifest};

/// Per-execution call counters, incremented on every broker call regardless
/// of whether it was ultimately allowed. The orchestrator reads these back
/// when it persists the terminal execution log row.
#[derive(Debug, Default)]
pub struct CallCounters {
    pub database: AtomicU64,
    pub http: AtomicU64,
    pub events: AtomicU64,
    pub denied: AtomicU64,
}

impl CallCounters {
    #[must_use]
    pub fn snapshot(&self) -> CallCountersSnapshot {
        CallCountersSnapshot {
            database: self.database.load(Ordering::Relaxed),
            http: self.http.load(Ordering::Relaxed),
            events: self.events.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CallCountersSnapshot {
    pub database: u64,
    pub http: u64,
    pub events: u64,
    pub denied: u64,
}

struct LiveExecution {
    api_token: String,
    manifest: Arc<TenantManifest>,
    script_manifest: Arc<ScriptManifest>,
    counters: Arc<CallCounters>,
}

/// Tracks which executions are currently live, mapping an `exec_id` to the
/// token and tenant manifest the orchestrator handed the sandbox for that
/// run. A broker call is authorized only while its execution is registered
/// here — once the orchestrator unregisters it (on completion, timeout, or
/// abort), every subsequent callback for that `exec_id` is rejected, closing
/// the window in which a crashed or lingering sandbox process could keep
/// calling back into the broker.
#[derive(Default)]
pub struct ExecutionRegistry {
    live: Mutex<HashMap<String, LiveExecution>>,
}

impl ExecutionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(
        &self,
        exec_id: impl Into<String>,
        api_token: impl Into<String>,
        manifest: Arc<TenantManifest>,
        script_manifest: Arc<ScriptManifest>,
    ) -> Arc<CallCounters> {
        let counters = Arc::new(CallCounters::default());
        let mut live = self.live.lock().await;
        live.insert(
            exec_id.into(),
            LiveExecution {
                api_token: api_token.into(),
                manifest,
                script_manifest,
                counters: Arc::clone(&counters),
            },
        );
        counters
    }

    pub async fn unregister(&self, exec_id: &str) -> Option<CallCountersSnapshot> {
        let mut live = self.live.lock().await;
        live.remove(exec_id).map(|entry| entry.counters.snapshot())
    }

    /// Validates the token and returns the manifest and counters for the
    /// execution, incrementing nothing itself — callers record the outcome
    /// via the returned counters.
    pub async fn authorize(
        &self,
        exec_id: &str,
        api_token: &str,
    ) -> Result<(Arc<TenantManifest>, Arc<ScriptManifest>, Arc<CallCounters>), BrokerError> {
        let live = self.live.lock().await;
        let entry = live.get(exec_id).ok_or_else(|| BrokerError::Unauthorized(exec_id.to_string()))?;
        if entry.api_token != api_token {
            return Err(BrokerError::Unauthorized(exec_id.to_string()));
        }
        Ok((Arc::clone(&entry.manifest), Arc::clone(&entry.script_manifest), Arc::clone(&entry.counters)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Capability;

    fn manifest() -> Arc<TenantManifest> {
        Arc::new(TenantManifest {
            tenant_id: "tenant-1".to_string(),
            capabilities: vec![Capability::Events],
            allowed_tables: vec![],
            enable_write_operations: false,
            max_query_results: 100,
            allowed_http_hosts: vec![],
            allow_private_networks: false,
            max_http_body_bytes: 0,
            http_timeout_ms: 0,
            max_http_redirects: 0,
            allowed_event_names: vec![],
        })
    }

    fn script_manifest() -> Arc<ScriptManifest> {
        Arc::new(ScriptManifest { capabilities: vec![Capability::Events] })
    }

    #[tokio::test]
    async fn wrong_token_is_rejected() {
        let registry = ExecutionRegistry::new();
        registry.register("exec-1", "token-a", manifest(), script_manifest()).await;
        let err = registry.authorize("exec-1", "token-b").await.unwrap_err();
        assert!(matches!(err, BrokerError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn unregistered_execution_is_rejected() {
        let registry = ExecutionRegistry::new();
        let err = registry.authorize("exec-1", "whatever").await.unwrap_err();
        assert!(matches!(err, BrokerError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn call_after_unregister_is_rejected() {
        let registry = ExecutionRegistry::new();
        registry.register("exec-1", "token-a", manifest(), script_manifest()).await;
        registry.unregister("exec-1").await;
        let err = registry.authorize("exec-1", "token-a").await.unwrap_err();
        assert!(matches!(err, BrokerError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn correct_token_is_authorized() {
        let registry = ExecutionRegistry::new();
        registry.register("exec-1", "token-a", manifest(), script_manifest()).await;
        let (manifest, script_manifest, _counters) = registry.authorize("exec-1", "token-a").await.unwrap();
        assert_eq!(manifest.tenant_id, "tenant-1");
        assert!(script_manifest.has_capability(Capability::Events));
    }
}
