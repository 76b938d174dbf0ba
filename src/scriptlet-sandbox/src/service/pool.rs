use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use scriptlet_broker::{Broker, CallbackRequest, Capability};
use scriptlet_common::{API_MODULE_NAME, HANDLER_FUNCTION_NAME};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;

use crate::{JSSandbox, LoadedJSSandbox, Script, SandboxBuilder, WallClockMonitor};
#[cfg(feature = "monitor-cpu-time")]
use crate::CpuTimeMonitor;
#[cfg(feature = "monitor-memory")]
use crate::MemoryMonitor;

use super::registry::ActiveExecutions;
use super::types::{ExecuteRequest, ExecuteResponse};

/// The identity currently bound to a warm sandbox's `api.*` host functions. Host module
/// registration happens once, at `load_runtime` time, so a reused sandbox's fixed
/// closures are rebound to a new execution by writing into this cell on checkout rather
/// than re-registering the module.
#[derive(Debug, Clone, Default)]
struct ExecBinding {
    exec_id: String,
    api_token: String,
    script_id: String,
    tenant_id: String,
}

type ExecCell = Arc<Mutex<Option<ExecBinding>>>;

/// Envelope a guest sends on an `api.call` host callback. `exec_id`/`api_token` are not
/// part of this: the host injects both itself from the `ExecCell`, so a script can never
/// forge another execution's identity even if it guesses at the wire format.
#[derive(Debug, Deserialize)]
struct GuestCallbackRequest {
    #[serde(rename = "type")]
    capability: Capability,
    method: String,
    #[serde(default)]
    params: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct GuestCallbackResponse {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// A small LRU of runtime-loaded-but-handler-free sandboxes. Checking a sandbox out of
/// the pool trades a `load_runtime` boot for a `restore`; each execution still gets a
/// freshly-added handler over a restored snapshot, so no script state or memory ever
/// survives between executions — only the VM boot is reused.
pub struct SandboxPool {
    broker: Arc<Broker>,
    warm: Mutex<VecDeque<(JSSandbox, ExecCell)>>,
    max_warm: usize,
}

impl SandboxPool {
    /// Builds an empty pool. `broker` is shared by every sandbox this pool creates;
    /// `max_warm` bounds how many unloaded, runtime-loaded sandboxes are kept ready.
    pub fn new(broker: Arc<Broker>, max_warm: usize) -> Self {
        Self { broker, warm: Mutex::new(VecDeque::new()), max_warm }
    }

    fn checkout(&self) -> crate::Result<(JSSandbox, ExecCell)> {
        if let Some(entry) = self.warm.lock().unwrap_or_else(PoisonError::into_inner).pop_front() {
            return Ok(entry);
        }
        new_warm_sandbox(&self.broker)
    }

    fn checkin(&self, sandbox: JSSandbox, cell: ExecCell) {
        let mut warm = self.warm.lock().unwrap_or_else(PoisonError::into_inner);
        if warm.len() < self.max_warm {
            warm.push_back((sandbox, cell));
        }
    }
}

fn new_warm_sandbox(broker: &Arc<Broker>) -> crate::Result<(JSSandbox, ExecCell)> {
    let cell: ExecCell = Arc::new(Mutex::new(None));
    let mut proto = SandboxBuilder::new().build()?;

    let call_broker = Arc::clone(broker);
    let call_cell = Arc::clone(&cell);
    proto.register(API_MODULE_NAME, "call", move |payload: String| -> String {
        handle_guest_call(&call_broker, &call_cell, payload)
    })?;

    let info_cell = Arc::clone(&cell);
    proto.register(API_MODULE_NAME, "info", move |_payload: String| -> String {
        handle_guest_info(&info_cell)
    })?;

    // Stateless and ungated: `utils.uuid()` never reaches the broker, the same as
    // `utils.now()` and `utils.hash()`, which are implemented entirely guest-side.
    // Generating the id here rather than in the guest is the one exception, since the
    // guest has no entropy source of its own to seed a UUID with.
    proto.register(API_MODULE_NAME, "uuid", move |_payload: String| -> String {
        uuid::Uuid::new_v4().to_string()
    })?;

    let sandbox = proto.load_runtime()?;
    Ok((sandbox, cell))
}

fn handle_guest_call(broker: &Arc<Broker>, cell: &ExecCell, payload: String) -> String {
    let outcome = decode_and_dispatch(broker, cell, &payload);
    let response = match outcome {
        Ok(result) => GuestCallbackResponse { ok: true, result: Some(result), error: None },
        Err(error) => GuestCallbackResponse { ok: false, result: None, error: Some(error) },
    };
    serde_json::to_string(&response)
        .unwrap_or_else(|_| r#"{"ok":false,"error":"failed to encode broker response"}"#.to_string())
}

fn decode_and_dispatch(broker: &Arc<Broker>, cell: &ExecCell, payload: &str) -> Result<serde_json::Value, String> {
    let guest_request: GuestCallbackRequest = serde_json::from_str(payload).map_err(|err| err.to_string())?;
    let binding = cell
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
        .ok_or_else(|| "no execution is bound to this sandbox".to_string())?;
    let request = CallbackRequest {
        exec_id: binding.exec_id,
        api_token: binding.api_token,
        capability: guest_request.capability,
        method: guest_request.method,
        params: guest_request.params,
    };
    Handle::current().block_on(broker.handle(request)).map_err(|err| err.to_string())
}

/// Answers `api.getScriptInfo()` straight from the binding the host injected at
/// checkout, bypassing the broker entirely: this is metadata about the execution
/// itself, not a capability a tenant manifest could plausibly deny.
fn handle_guest_info(cell: &ExecCell) -> String {
    let binding = cell.lock().unwrap_or_else(PoisonError::into_inner).clone();
    match binding {
        Some(binding) => serde_json::json!({
            "id": binding.script_id,
            "client_id": binding.tenant_id,
            "execution_id": binding.exec_id,
        })
        .to_string(),
        None => r#"{"error":"no execution is bound to this sandbox"}"#.to_string(),
    }
}

/// How often the memory monitor samples process RSS while a handler runs.
#[cfg(feature = "monitor-memory")]
const MEMORY_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Reports the host process's current resident set size, in bytes, as a conservative
/// stand-in for the guest's own memory usage.
///
/// Hyperlight maps guest memory into the host process rather than a separate address
/// space, so process RSS is always an overestimate of any one guest's footprint (it also
/// counts every other warm sandbox and the host runtime itself) — but it is the only
/// memory reading obtainable without a verified guest-side accounting API, and an
/// overestimate that occasionally trips early is the correct failure direction for a
/// resource limit. Linux-only: `/proc/self/status` has no analog this crate can read
/// without adding a platform dependency, so the monitor is not wired in on other targets.
#[cfg(all(feature = "monitor-memory", target_os = "linux"))]
fn sample_process_rss_bytes() -> Option<usize> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let line = status.lines().find(|line| line.starts_with("VmRSS:"))?;
    let kib: usize = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kib * 1024)
}

#[cfg(all(feature = "monitor-cpu-time", feature = "monitor-memory", target_os = "linux"))]
fn run_handler(
    loaded: &mut LoadedJSSandbox,
    event: String,
    wall_clock: Duration,
    cpu_time_ms: u64,
    memory_bytes: usize,
) -> crate::Result<String> {
    let wall = WallClockMonitor::new(wall_clock)?;
    let memory = MemoryMonitor::new(memory_bytes.max(1), MEMORY_POLL_INTERVAL, sample_process_rss_bytes)?;
    if cpu_time_ms > 0 {
        let monitor = (wall, CpuTimeMonitor::new(Duration::from_millis(cpu_time_ms))?, memory);
        loaded.handle_event_with_monitor(HANDLER_FUNCTION_NAME, event, &monitor, None)
    } else {
        let monitor = (wall, memory);
        loaded.handle_event_with_monitor(HANDLER_FUNCTION_NAME, event, &monitor, None)
    }
}

#[cfg(all(feature = "monitor-cpu-time", not(all(feature = "monitor-memory", target_os = "linux"))))]
fn run_handler(
    loaded: &mut LoadedJSSandbox,
    event: String,
    wall_clock: Duration,
    cpu_time_ms: u64,
    _memory_bytes: usize,
) -> crate::Result<String> {
    if cpu_time_ms > 0 {
        let monitor = (WallClockMonitor::new(wall_clock)?, CpuTimeMonitor::new(Duration::from_millis(cpu_time_ms))?);
        loaded.handle_event_with_monitor(HANDLER_FUNCTION_NAME, event, &monitor, None)
    } else {
        let monitor = WallClockMonitor::new(wall_clock)?;
        loaded.handle_event_with_monitor(HANDLER_FUNCTION_NAME, event, &monitor, None)
    }
}

#[cfg(all(not(feature = "monitor-cpu-time"), feature = "monitor-memory", target_os = "linux"))]
fn run_handler(
    loaded: &mut LoadedJSSandbox,
    event: String,
    wall_clock: Duration,
    _cpu_time_ms: u64,
    memory_bytes: usize,
) -> crate::Result<String> {
    let monitor = (
        WallClockMonitor::new(wall_clock)?,
        MemoryMonitor::new(memory_bytes.max(1), MEMORY_POLL_INTERVAL, sample_process_rss_bytes)?,
    );
    loaded.handle_event_with_monitor(HANDLER_FUNCTION_NAME, event, &monitor, None)
}

#[cfg(all(not(feature = "monitor-cpu-time"), not(all(feature = "monitor-memory", target_os = "linux"))))]
fn run_handler(
    loaded: &mut LoadedJSSandbox,
    event: String,
    wall_clock: Duration,
    _cpu_time_ms: u64,
    _memory_bytes: usize,
) -> crate::Result<String> {
    let monitor = WallClockMonitor::new(wall_clock)?;
    loaded.handle_event_with_monitor(HANDLER_FUNCTION_NAME, event, &monitor, None)
}

fn failure(err: impl std::fmt::Display) -> ExecuteResponse {
    ExecuteResponse { success: false, result: None, error: Some(err.to_string()), execution_time_ms: 0, memory_used_bytes: 0, output_lines: vec![] }
}

/// Runs one execution: checks a warm sandbox out of `pool`, binds it to `request`'s
/// execution id and broker token, adds the script as its handler, runs it under a
/// wall-clock (and, when enabled, CPU-time and memory) monitor on a blocking thread,
/// then returns the sandbox to the pool.
///
/// `memory_used_bytes` is a process-RSS sample taken just after the handler returns
/// (Linux only; `0` elsewhere) — an overestimate of the one guest's actual footprint,
/// since it is shared with every other warm sandbox and the host runtime, but the same
/// conservative reading [`MemoryMonitor`] enforces the hard limit against.
pub async fn run(pool: &Arc<SandboxPool>, active: &Arc<ActiveExecutions>, request: ExecuteRequest) -> ExecuteResponse {
    let started = Instant::now();

    let (mut sandbox, cell) = match pool.checkout() {
        Ok(entry) => entry,
        Err(err) => return failure(err),
    };

    *cell.lock().unwrap_or_else(PoisonError::into_inner) = Some(ExecBinding {
        exec_id: request.exec_id.clone(),
        api_token: request.broker_token.clone(),
        script_id: request.script_id.clone(),
        tenant_id: request.tenant_id.clone(),
    });

    if let Err(err) = sandbox.add_handler(HANDLER_FUNCTION_NAME, Script::from_content(request.code.clone())) {
        return failure(err);
    }

    let loaded = match sandbox.get_loaded_sandbox() {
        Ok(loaded) => loaded,
        Err(err) => return failure(err),
    };

    let interrupt_handle = loaded.interrupt_handle();
    active.insert(request.exec_id.clone(), interrupt_handle);

    let event_payload = serde_json::to_string(&request.context).unwrap_or_else(|_| "null".to_string());
    let wall_clock = Duration::from_millis(request.budgets.wall_clock_ms.max(1));
    let cpu_time_ms = request.budgets.cpu_time_ms;
    let memory_bytes = request.budgets.memory_bytes;

    let join = tokio::task::spawn_blocking(move || {
        let mut loaded = loaded;
        let result = run_handler(&mut loaded, event_payload, wall_clock, cpu_time_ms, memory_bytes);
        (result, loaded)
    })
    .await;

    active.remove(&request.exec_id);

    #[cfg(all(feature = "monitor-memory", target_os = "linux"))]
    let memory_used_bytes = sample_process_rss_bytes().unwrap_or(0);
    #[cfg(not(all(feature = "monitor-memory", target_os = "linux")))]
    let memory_used_bytes = 0;

    let (result, loaded) = match join {
        Ok(pair) => pair,
        Err(join_err) => return failure(join_err),
    };

    if let Ok(restored) = loaded.unload() {
        pool.checkin(restored, cell);
    }

    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    match result {
        Ok(raw) => match serde_json::from_str(&raw) {
            Ok(value) => {
                ExecuteResponse { success: true, result: Some(value), error: None, execution_time_ms: elapsed_ms, memory_used_bytes, output_lines: vec![] }
            }
            Err(err) => failure(err),
        },
        Err(err) => {
            ExecuteResponse { success: false, result: None, error: Some(err.to_string()), execution_time_ms: elapsed_ms, memory_used_bytes, output_lines: vec![] }
        }
    }
}
