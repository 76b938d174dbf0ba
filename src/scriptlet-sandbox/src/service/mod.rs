//! The sandbox executor's HTTP contract: `/execute`, `/stop`, `/validate`, `/health`,
//! and `/status`, plus the warm-sandbox pool and host-side `api.*` bridge that back
//! `/execute`.

mod pool;
mod registry;
mod types;

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use scriptlet_broker::Broker;
use tracing::instrument;

use self::pool::SandboxPool;
use self::registry::ActiveExecutions;
pub use types::{Budgets, ExecuteRequest, ExecuteResponse, StatusResponse, StopRequest, StopResponse, ValidateRequest, ValidateResponse};

/// Shared state for the sandbox executor's HTTP service.
#[derive(Clone)]
pub struct AppState {
    pool: Arc<SandboxPool>,
    active: Arc<ActiveExecutions>,
}

impl AppState {
    /// Builds the service state. `broker` is shared by every sandbox this process
    /// creates; `max_warm_sandboxes` bounds the runtime-loaded-but-handler-free pool
    /// kept ready to skip a `load_runtime` call on the next execution, and is also used
    /// as this process's concurrent-execution capacity for `/health`.
    #[must_use]
    pub fn new(broker: Arc<Broker>, max_warm_sandboxes: usize) -> Self {
        Self { pool: Arc::new(SandboxPool::new(broker, max_warm_sandboxes)), active: Arc::new(ActiveExecutions::new(max_warm_sandboxes)) }
    }
}

/// Builds the axum router exposing the sandbox executor's HTTP contract.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/execute", post(execute))
        .route("/stop", post(stop))
        .route("/validate", post(validate))
        .route("/health", get(health))
        .route("/status", get(status))
        .with_state(state)
}

#[instrument(skip(state, request), fields(exec_id = %request.exec_id))]
async fn execute(State(state): State<AppState>, Json(request): Json<ExecuteRequest>) -> Json<ExecuteResponse> {
    Json(pool::run(&state.pool, &state.active, request).await)
}

#[instrument(skip(state))]
async fn stop(State(state): State<AppState>, Json(request): Json<StopRequest>) -> Json<StopResponse> {
    let stopped = state.active.abort(&request.exec_id);
    Json(StopResponse { success: true, stopped, execution_id: request.exec_id })
}

#[instrument(skip(state, request))]
async fn validate(State(_state): State<AppState>, Json(request): Json<ValidateRequest>) -> Json<ValidateResponse> {
    let analysis = scriptlet_security::analyze(&request.code);
    let syntax_error = analysis.issues.iter().find(|issue| issue.kind == "syntax_error");
    Json(match syntax_error {
        Some(issue) => ValidateResponse { valid: false, error: Some(issue.message.clone()) },
        None => ValidateResponse { valid: true, error: None },
    })
}

async fn health(State(state): State<AppState>) -> &'static str {
    if state.active.accepting_work() {
        "OK"
    } else {
        "BUSY"
    }
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse { active_count: state.active.count(), exec_ids: state.active.ids() })
}
