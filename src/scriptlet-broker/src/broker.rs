use std::sync::Arc;

use crate::db::DbExecutor;
use crate::error::BrokerError;
use crate::events::EventSink;
use crate::manifest::{ScriptManifest, TenantManifest};
use crate::registry::{CallCountersSnapshot, ExecutionRegistry};
use crate::types::{Capability, CallbackRequest, EventDispatch, HttpRequest};
use crate::{db, events, http};

/// The host-side capability broker. One instance is shared across all
/// concurrent executions on a host; per-execution state lives in the
/// [`ExecutionRegistry`].
pub struct Broker {
    registry: ExecutionRegistry,
    db_executor: Arc<dyn DbExecutor>,
    event_sink: Arc<dyn EventSink>,
}

impl Broker {
    #[must_use]
    pub fn new(db_executor: Arc<dyn DbExecutor>, event_sink: Arc<dyn EventSink>) -> Self {
        Self { registry: ExecutionRegistry::new(), db_executor, event_sink }
    }

    /// Registers a new execution as live, returning the token the sandbox
    /// must echo back on every broker callback. `script_manifest` scopes the
    /// capabilities this particular script may use, on top of whatever its
    /// tenant's manifest separately grants.
    pub async fn begin_execution(
        &self,
        exec_id: impl Into<String>,
        api_token: impl Into<String>,
        manifest: TenantManifest,
        script_manifest: ScriptManifest,
    ) {
        self.registry.register(exec_id, api_token, Arc::new(manifest), Arc::new(script_manifest)).await;
    }

    /// Unregisters an execution, rejecting any further callback under its
    /// id, and returns the call counters accumulated over its lifetime.
    pub async fn end_execution(&self, exec_id: &str) -> Option<CallCountersSnapshot> {
        self.registry.unregister(exec_id).await
    }

    /// Handles one broker callback. A capability violation is returned as
    /// an `Err` rather than panicking or terminating the execution — the
    /// sandbox executor turns it into a thrown JS error on the script side,
    /// and the orchestrator records it as a security flag.
    #[tracing::instrument(skip(self, request), fields(exec_id = %request.exec_id, capability = ?request.capability, method = %request.method))]
    pub async fn handle(&self, request: CallbackRequest) -> Result<serde_json::Value, BrokerError> {
        let (manifest, script_manifest, counters) =
            self.registry.authorize(&request.exec_id, &request.api_token).await?;

        if !script_manifest.has_capability(request.capability) {
            counters.denied.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            let name = match request.capability {
                Capability::Database => "database",
                Capability::Http => "http",
                Capability::Events => "events",
            };
            return Err(BrokerError::CapabilityDenied(format!("{name} (not declared by this script)")));
        }

        let result = match request.capability {
            Capability::Database => {
                counters.database.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                db::handle(&manifest, self.db_executor.as_ref(), &request.method, request.params).await
            }
            Capability::Http => {
                counters.http.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                let http_request: HttpRequest = serde_json::from_value(request.params)
                    .map_err(|err| BrokerError::Invalid(err.to_string()))?;
                http::handle(&manifest, &http_request).await
            }
            Capability::Events => {
                counters.events.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                let dispatch: EventDispatch = serde_json::from_value(request.params)
                    .map_err(|err| BrokerError::Invalid(err.to_string()))?;
                events::handle(&manifest, self.event_sink.as_ref(), &dispatch).await
            }
        };

        if result.is_err() {
            counters.denied.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            tracing::warn!(error = ?result.as_ref().err(), "capability broker denied a call");
        }
        result
    }
}
