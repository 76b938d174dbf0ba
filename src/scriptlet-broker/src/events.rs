use async_trait::async_trait;

use crate::error::BrokerError;
use crate::manifest::TenantManifest;
use crate::types::{Capability, EventDispatch};

/// The host application's event bus. Implementations route a dispatched
/// event to wherever the platform's own trigger router or message bus
/// listens.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn dispatch(&self, tenant_id: &str, name: &str, payload: &serde_json::Value) -> Result<(), BrokerError>;
}

/// Validates an `events.dispatch` call against the tenant manifest's
/// allowlist and the platform-wide forbidden prefixes, then hands it to
/// `sink`.
pub async fn handle(
    manifest: &TenantManifest,
    sink: &dyn EventSink,
    dispatch: &EventDispatch,
) -> Result<serde_json::Value, BrokerError> {
    if !manifest.has_capability(Capability::Events) {
        return Err(BrokerError::CapabilityDenied("events".to_string()));
    }
    if !manifest.allows_event(&dispatch.name) {
        return Err(BrokerError::EventNotAllowed(dispatch.name.clone()));
    }
    sink.dispatch(&manifest.tenant_id, &dispatch.name, &dispatch.payload).await?;
    Ok(serde_json::json!({ "dispatched": true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink(AtomicUsize);

    #[async_trait]
    impl EventSink for CountingSink {
        async fn dispatch(
            &self,
            _tenant_id: &str,
            _name: &str,
            _payload: &serde_json::Value,
        ) -> Result<(), BrokerError> {
            self.0.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    fn manifest(allowed: &[&str]) -> TenantManifest {
        TenantManifest {
            tenant_id: "tenant-1".to_string(),
            capabilities: vec![Capability::Events],
            allowed_tables: vec![],
            enable_write_operations: false,
            max_query_results: 0,
            allowed_http_hosts: vec![],
            allow_private_networks: false,
            max_http_body_bytes: 0,
            http_timeout_ms: 0,
            max_http_redirects: 0,
            allowed_event_names: allowed.iter().map(|e| (*e).to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn allowed_event_reaches_sink() {
        let sink = CountingSink(AtomicUsize::new(0));
        let manifest = manifest(&["order.created"]);
        let dispatch = EventDispatch { name: "order.created".to_string(), payload: serde_json::json!({}) };
        handle(&manifest, &sink, &dispatch).await.unwrap();
        assert_eq!(sink.0.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn forbidden_system_prefix_never_reaches_sink() {
        let sink = CountingSink(AtomicUsize::new(0));
        let mut manifest = manifest(&[]);
        manifest.allowed_event_names.push("system.shutdown".to_string());
        let dispatch = EventDispatch { name: "system.shutdown".to_string(), payload: serde_json::json!({}) };
        let err = handle(&manifest, &sink, &dispatch).await.unwrap_err();
        assert!(matches!(err, BrokerError::EventNotAllowed(_)));
        assert_eq!(sink.0.load(Ordering::Relaxed), 0);
    }
}
