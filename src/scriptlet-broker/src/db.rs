use async_trait::async_trait;

use crate::error::BrokerError;
use crate::manifest::{TenantManifest, ALWAYS_DENIED_TABLES};
use crate::types::{Capability, DbOp, DbRequest};

/// The host application's database connection, invoked only after the
/// broker has cleared a request against the tenant manifest and the
/// hardcoded denylist. Implementations own whatever SQL dialect and
/// connection pool the surrounding application actually uses — the broker
/// itself has no opinion on that, only on which tables and operations a
/// script may reach.
#[async_trait]
pub trait DbExecutor: Send + Sync {
    async fn execute(
        &self,
        tenant_id: &str,
        request: &DbRequest,
    ) -> Result<serde_json::Value, BrokerError>;
}

/// Validates a database capability call against the tenant manifest and the
/// platform-wide denylist, then (if allowed) hands it to `executor` and
/// truncates a `select`/`query` result array to `max_query_results`.
pub async fn handle(
    manifest: &TenantManifest,
    executor: &dyn DbExecutor,
    method: &str,
    params: serde_json::Value,
) -> Result<serde_json::Value, BrokerError> {
    if !manifest.has_capability(Capability::Database) {
        return Err(BrokerError::CapabilityDenied("database".to_string()));
    }
    let op = DbOp::parse(method)
        .ok_or_else(|| BrokerError::Invalid(format!("unknown database method `{method}`")))?;
    let table = params.get("table").and_then(serde_json::Value::as_str).map(str::to_string);

    // `query` runs arbitrary SQL rather than targeting a single table, so there is no
    // table name to check against the denylist or allowlist here; the capability check
    // above is this op's only gate. Every other op names exactly one table and is scoped
    // by it.
    if op != DbOp::Query {
        let table = table
            .clone()
            .ok_or_else(|| BrokerError::Invalid("database call missing `table`".to_string()))?;
        if ALWAYS_DENIED_TABLES.contains(&table.as_str()) {
            return Err(BrokerError::TableDenied(table));
        }
        if !manifest.allows_table(&table) {
            return Err(BrokerError::TableDenied(table));
        }
    }
    if op.is_write() && !manifest.enable_write_operations {
        return Err(BrokerError::WriteDisabled);
    }

    let request = DbRequest { op, table: table.unwrap_or_default(), params };
    let result = executor.execute(&manifest.tenant_id, &request).await?;
    Ok(truncate_results(result, manifest.max_query_results))
}

/// Truncates a `select`/`query` result's row array to `limit` entries.
/// Non-array results (e.g. the row count from a write) pass through
/// unchanged.
fn truncate_results(result: serde_json::Value, limit: usize) -> serde_json::Value {
    match result {
        serde_json::Value::Array(mut rows) => {
            rows.truncate(limit);
            serde_json::Value::Array(rows)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoExecutor;

    #[async_trait]
    impl DbExecutor for EchoExecutor {
        async fn execute(
            &self,
            _tenant_id: &str,
            _request: &DbRequest,
        ) -> Result<serde_json::Value, BrokerError> {
            Ok(json!([{"id": 1}, {"id": 2}, {"id": 3}]))
        }
    }

    fn manifest(allowed_tables: &[&str], enable_write: bool, max_results: usize) -> TenantManifest {
        TenantManifest {
            tenant_id: "tenant-1".to_string(),
            capabilities: vec![Capability::Database],
            allowed_tables: allowed_tables.iter().map(|t| (*t).to_string()).collect(),
            enable_write_operations: enable_write,
            max_query_results: max_results,
            allowed_http_hosts: vec![],
            allow_private_networks: false,
            max_http_body_bytes: 0,
            http_timeout_ms: 0,
            max_http_redirects: 0,
            allowed_event_names: vec![],
        }
    }

    #[tokio::test]
    async fn denylisted_table_is_always_rejected_even_if_allowlisted() {
        let manifest = manifest(&["scripts"], true, 10);
        let err = handle(&manifest, &EchoExecutor, "select", json!({"table": "scripts"}))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::TableDenied(_)));
    }

    #[tokio::test]
    async fn table_not_in_allowlist_is_rejected() {
        let manifest = manifest(&["orders"], true, 10);
        let err = handle(&manifest, &EchoExecutor, "select", json!({"table": "customers"}))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::TableDenied(_)));
    }

    #[tokio::test]
    async fn write_ops_require_enable_write_operations() {
        let manifest = manifest(&["orders"], false, 10);
        let err = handle(&manifest, &EchoExecutor, "insert", json!({"table": "orders"}))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::WriteDisabled));
    }

    #[tokio::test]
    async fn select_results_are_truncated_to_max_query_results() {
        let manifest = manifest(&["orders"], true, 2);
        let result =
            handle(&manifest, &EchoExecutor, "select", json!({"table": "orders", "limit": 3}))
                .await
                .unwrap();
        assert_eq!(result.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn query_does_not_require_a_table() {
        let manifest = manifest(&[], true, 10);
        let result = handle(&manifest, &EchoExecutor, "query", json!({"sql": "select 1"})).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn missing_database_capability_is_rejected() {
        let mut manifest = manifest(&["orders"], true, 10);
        manifest.capabilities.clear();
        let err = handle(&manifest, &EchoExecutor, "select", json!({"table": "orders"}))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::CapabilityDenied(_)));
    }
}
