//! Operator-facing binary: runs one script against a fixture tenant and prints the
//! outcome as JSON. Starts a real sandbox executor service on a loopback port and a
//! real orchestrator on top of an in-memory log store — this is a local debugging
//! harness, not a deployment of the platform.
#![allow(clippy::disallowed_macros)]

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use scriptlet_broker::{Broker, Capability, DbExecutor, DbRequest, EventSink, TenantManifest};
use scriptlet_logstore::SqliteLogStore;
use scriptlet_orchestrator::fixtures::{StaticManifest, StaticScriptRegistry, UnlimitedQuota};
use scriptlet_orchestrator::{Caller, CallerRole, ExecutionRequest, Orchestrator, ScriptRecord};
use scriptlet_sandbox::service::{router, AppState};
use tokio::net::TcpListener;

const SCRIPT_ID: &str = "cli-script";

/// Runs a single script against a fixture tenant and prints the execution outcome.
#[derive(Parser)]
struct Cli {
    /// Path to the script's JavaScript source.
    script: PathBuf,
    /// Path to a JSON file containing the event/context payload to pass to the handler.
    /// Defaults to `{}`.
    #[arg(long)]
    event: Option<PathBuf>,
    /// Tenant id to run the script as.
    #[arg(long, default_value = "local-dev")]
    tenant: String,
}

struct LoggingDb;

#[async_trait::async_trait]
impl DbExecutor for LoggingDb {
    async fn execute(&self, tenant_id: &str, request: &DbRequest) -> Result<serde_json::Value, scriptlet_broker::BrokerError> {
        eprintln!("[db] tenant={tenant_id} op={:?} table={}", request.op, request.table);
        Ok(serde_json::Value::Array(vec![]))
    }
}

struct LoggingEvents;

#[async_trait::async_trait]
impl EventSink for LoggingEvents {
    async fn dispatch(&self, tenant_id: &str, name: &str, payload: &serde_json::Value) -> Result<(), scriptlet_broker::BrokerError> {
        eprintln!("[event] tenant={tenant_id} name={name} payload={payload}");
        Ok(())
    }
}

fn fixture_manifest(tenant_id: String) -> TenantManifest {
    TenantManifest {
        tenant_id,
        capabilities: vec![Capability::Database, Capability::Http, Capability::Events],
        allowed_tables: vec![],
        enable_write_operations: true,
        max_query_results: 100,
        allowed_http_hosts: vec![],
        allow_private_networks: false,
        max_http_body_bytes: 1024 * 1024,
        http_timeout_ms: 5_000,
        max_http_redirects: 3,
        allowed_event_names: vec![],
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let source = fs::read_to_string(&cli.script).with_context(|| format!("reading {}", cli.script.display()))?;
    let context: serde_json::Value = match &cli.event {
        Some(path) => serde_json::from_str(&fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?)?,
        None => serde_json::json!({}),
    };

    let broker = Arc::new(Broker::new(Arc::new(LoggingDb), Arc::new(LoggingEvents)));
    let listener = TcpListener::bind("127.0.0.1:0").await.context("binding the sandbox executor's loopback listener")?;
    let sandbox_addr = listener.local_addr()?;
    let app_state = AppState::new(Arc::clone(&broker), 4);
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, router(app_state)).await {
            eprintln!("sandbox executor service exited: {err}");
        }
    });

    let script_registry = Arc::new(StaticScriptRegistry::new());
    script_registry.insert(ScriptRecord {
        script_id: SCRIPT_ID.to_string(),
        tenant_id: cli.tenant.clone(),
        source,
        active: true,
        capabilities: vec![Capability::Database, Capability::Http, Capability::Events],
    });

    let log_store = Arc::new(SqliteLogStore::open_in_memory().context("opening the in-memory execution log store")?);
    let orchestrator = Orchestrator::new(
        script_registry,
        Arc::new(UnlimitedQuota),
        Arc::new(StaticManifest(fixture_manifest(cli.tenant.clone()))),
        1,
        broker,
        log_store,
        format!("http://{sandbox_addr}"),
    );

    let outcome = orchestrator
        .admit_and_run(ExecutionRequest {
            script_id: SCRIPT_ID.to_string(),
            tenant_id: cli.tenant.clone(),
            trigger_kind: "cli".to_string(),
            context,
            budgets: None,
            caller: Caller { caller_id: "cli".to_string(), tenant_id: cli.tenant, roles: vec![CallerRole::TenantOperator] },
        })
        .await
        .context("running the script")?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
