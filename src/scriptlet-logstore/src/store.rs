use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::error::LogStoreError;
use crate::types::{
    ExecutionLog, ExecutionStatus, NewExecutionLog, SecurityFlag, TenantExecutionStats, TimeRange,
    TransitionUpdate,
};
use crate::LogStore;

const SCHEMA: &str = include_str!("../migrations/0001_init.sql");

const SELECT_COLUMNS: &str = "id, script_id, tenant_id, trigger_kind, status, created_at, \
     started_at, finished_at, execution_time_ms, memory_used_bytes, result_json, error, \
     output_lines_json, security_flags_json";

/// `SQLite`-backed [`LogStore`].
///
/// A single connection guarded by a mutex is sufficient here: writes are
/// short CAS updates or single-row inserts, and `SQLite`'s WAL mode lets
/// reads proceed without blocking on the writer.
pub struct SqliteLogStore {
    conn: Mutex<Connection>,
}

impl SqliteLogStore {
    /// Opens (creating if necessary) a log store backed by the database file
    /// at `path`, applying the schema migration if it hasn't run yet.
    ///
    /// # Errors
    ///
    /// Returns [`LogStoreError::Db`] if the database cannot be opened or the
    /// schema cannot be applied.
    pub fn open(path: &Path) -> Result<Self, LogStoreError> {
        let conn = Connection::open(path).map_err(|err| LogStoreError::Db(err.to_string()))?;
        Self::from_connection(conn)
    }

    /// Opens an in-memory store. Useful for tests and for the CLI's single-run mode.
    ///
    /// # Errors
    ///
    /// Returns [`LogStoreError::Db`] if the in-memory database cannot be initialized.
    pub fn open_in_memory() -> Result<Self, LogStoreError> {
        let conn = Connection::open_in_memory().map_err(|err| LogStoreError::Db(err.to_string()))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, LogStoreError> {
        conn.pragma_update(None, "journal_mode", "wal")
            .map_err(|err| LogStoreError::Db(err.to_string()))?;
        conn.pragma_update(None, "foreign_keys", "on")
            .map_err(|err| LogStoreError::Db(err.to_string()))?;
        conn.execute_batch(SCHEMA).map_err(|err| LogStoreError::Db(err.to_string()))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, LogStoreError> {
        self.conn.lock().map_err(|_| LogStoreError::Db("log store mutex poisoned".to_string()))
    }

    /// Looks up the current status of a row, used to build a precise
    /// [`LogStoreError::CasMismatch`] after a zero-row `UPDATE`.
    fn current_status(conn: &Connection, id: &str) -> Result<Option<ExecutionStatus>, LogStoreError> {
        conn.query_row("SELECT status FROM execution_logs WHERE id = ?1", params![id], |row| {
            row.get::<_, String>(0)
        })
        .optional()
        .map_err(|err| LogStoreError::Db(err.to_string()))?
        .map(|raw| {
            ExecutionStatus::from_db_str(&raw)
                .ok_or_else(|| LogStoreError::Db(format!("unrecognized status in row: {raw}")))
        })
        .transpose()
    }
}

fn row_to_log(row: &Row<'_>) -> rusqlite::Result<ExecutionLog> {
    let status_raw: String = row.get(4)?;
    let status = ExecutionStatus::from_db_str(&status_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unrecognized execution status: {status_raw}").into(),
        )
    })?;
    let result_json: Option<String> = row.get(10)?;
    let result = result_json
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(10, rusqlite::types::Type::Text, Box::new(err))
        })?;
    let output_lines_json: String = row.get(12)?;
    let output_lines: Vec<String> = serde_json::from_str(&output_lines_json).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(12, rusqlite::types::Type::Text, Box::new(err))
    })?;
    let security_flags_json: String = row.get(13)?;
    let security_flags: Vec<SecurityFlag> =
        serde_json::from_str(&security_flags_json).map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(13, rusqlite::types::Type::Text, Box::new(err))
        })?;
    Ok(ExecutionLog {
        id: row.get(0)?,
        script_id: row.get(1)?,
        tenant_id: row.get(2)?,
        trigger_kind: row.get(3)?,
        status,
        created_at: row.get(5)?,
        started_at: row.get(6)?,
        finished_at: row.get(7)?,
        execution_time_ms: row.get(8)?,
        memory_used_bytes: row.get(9)?,
        result,
        error: row.get(11)?,
        output_lines,
        security_flags,
    })
}

/// Checks that a requested transition pairs a valid origin status with the
/// kind of update being applied, rejecting the call before it ever touches
/// SQL. The `UPDATE ... WHERE status = ?` below is what actually enforces
/// the compare-and-swap against concurrent transitions; this check only
/// rejects transitions that could never be legal regardless of timing.
fn validate_transition_shape(
    expected_prev_status: ExecutionStatus,
    update: &TransitionUpdate,
) -> Result<(), LogStoreError> {
    if expected_prev_status.is_terminal() {
        return Err(LogStoreError::Invalid(format!(
            "{expected_prev_status:?} is a terminal status and accepts no further transition"
        )));
    }
    match (expected_prev_status, update) {
        (ExecutionStatus::Pending, TransitionUpdate::Start { .. }) => Ok(()),
        (ExecutionStatus::Running, TransitionUpdate::Finish { .. }) => Ok(()),
        // An execution rejected during admission (unknown script, quota, security
        // block, ...) never starts running; its row goes straight from pending to
        // a terminal status so it still shows up in the tenant's history.
        (ExecutionStatus::Pending, TransitionUpdate::Finish { .. }) => Ok(()),
        _ => Err(LogStoreError::Invalid(format!(
            "no legal transition from {expected_prev_status:?} to {:?}",
            update.target_status()
        ))),
    }
}

impl LogStore for SqliteLogStore {
    fn create(&self, new: NewExecutionLog) -> Result<(), LogStoreError> {
        let conn = self.lock()?;
        let security_flags_json = serde_json::to_string(&new.security_flags)
            .map_err(|err| LogStoreError::Invalid(err.to_string()))?;
        let rows = conn.execute(
            "INSERT INTO execution_logs (id, script_id, tenant_id, trigger_kind, status, \
             created_at, security_flags_json) VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?6)",
            params![
                new.id,
                new.script_id,
                new.tenant_id,
                new.trigger_kind,
                new.created_at,
                security_flags_json
            ],
        );
        match rows {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(LogStoreError::Invalid(format!("execution log {} already exists", new.id)))
            }
            Err(err) => Err(LogStoreError::Db(err.to_string())),
        }
    }

    fn transition(
        &self,
        id: &str,
        expected_prev_status: ExecutionStatus,
        update: TransitionUpdate,
    ) -> Result<(), LogStoreError> {
        validate_transition_shape(expected_prev_status, &update)?;
        let conn = self.lock()?;
        let new_status = update.target_status();
        let rows_affected = match &update {
            TransitionUpdate::Start { started_at } => conn
                .execute(
                    "UPDATE execution_logs SET status = ?1, started_at = ?2 WHERE id = ?3 AND \
                     status = ?4",
                    params![
                        new_status.as_db_str(),
                        started_at,
                        id,
                        expected_prev_status.as_db_str()
                    ],
                )
                .map_err(|err| LogStoreError::Db(err.to_string()))?,
            TransitionUpdate::Finish {
                status,
                finished_at,
                execution_time_ms,
                memory_used_bytes,
                result,
                error,
                output_lines,
                security_flags,
            } => {
                let result_json = result
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()
                    .map_err(|err| LogStoreError::Invalid(err.to_string()))?;
                let output_lines_json = serde_json::to_string(output_lines)
                    .map_err(|err| LogStoreError::Invalid(err.to_string()))?;
                let security_flags_json = serde_json::to_string(security_flags)
                    .map_err(|err| LogStoreError::Invalid(err.to_string()))?;
                conn.execute(
                    "UPDATE execution_logs SET status = ?1, finished_at = ?2, execution_time_ms \
                     = ?3, memory_used_bytes = ?4, result_json = ?5, error = ?6, \
                     output_lines_json = ?7, security_flags_json = ?8 WHERE id = ?9 AND status = \
                     ?10",
                    params![
                        status.as_db_str(),
                        finished_at,
                        execution_time_ms,
                        memory_used_bytes,
                        result_json,
                        error,
                        output_lines_json,
                        security_flags_json,
                        id,
                        expected_prev_status.as_db_str()
                    ],
                )
                .map_err(|err| LogStoreError::Db(err.to_string()))?
            }
        };
        if rows_affected == 0 {
            return Err(match Self::current_status(&conn, id)? {
                None => LogStoreError::NotFound(id.to_string()),
                Some(actual) => LogStoreError::CasMismatch {
                    id: id.to_string(),
                    expected: expected_prev_status.as_db_str().to_string(),
                    actual: actual.as_db_str().to_string(),
                },
            });
        }
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<ExecutionLog>, LogStoreError> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM execution_logs WHERE id = ?1"),
            params![id],
            row_to_log,
        )
        .optional()
        .map_err(|err| LogStoreError::Db(err.to_string()))
    }

    fn list_by_script(&self, script_id: &str, limit: u32) -> Result<Vec<ExecutionLog>, LogStoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM execution_logs WHERE script_id = ?1 ORDER BY \
                 created_at DESC LIMIT ?2"
            ))
            .map_err(|err| LogStoreError::Db(err.to_string()))?;
        let rows = stmt
            .query_map(params![script_id, limit], row_to_log)
            .map_err(|err| LogStoreError::Db(err.to_string()))?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(|err| LogStoreError::Db(err.to_string()))
    }

    fn list_by_tenant(
        &self,
        tenant_id: &str,
        range: TimeRange,
    ) -> Result<Vec<ExecutionLog>, LogStoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM execution_logs WHERE tenant_id = ?1 AND \
                 created_at >= ?2 AND created_at < ?3 ORDER BY created_at DESC"
            ))
            .map_err(|err| LogStoreError::Db(err.to_string()))?;
        let rows = stmt
            .query_map(params![tenant_id, range.since, range.until], row_to_log)
            .map_err(|err| LogStoreError::Db(err.to_string()))?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(|err| LogStoreError::Db(err.to_string()))
    }

    fn aggregate_by_tenant(
        &self,
        tenant_id: &str,
        range: TimeRange,
    ) -> Result<TenantExecutionStats, LogStoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT status, COUNT(*), AVG(execution_time_ms) FROM execution_logs WHERE \
                 tenant_id = ?1 AND created_at >= ?2 AND created_at < ?3 GROUP BY status",
            )
            .map_err(|err| LogStoreError::Db(err.to_string()))?;
        let rows = stmt
            .query_map(params![tenant_id, range.since, range.until], |row| {
                let status_raw: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                let avg_ms: Option<f64> = row.get(2)?;
                Ok((status_raw, count, avg_ms))
            })
            .map_err(|err| LogStoreError::Db(err.to_string()))?;

        let mut stats = TenantExecutionStats::default();
        let mut finished_avg_weighted = 0.0_f64;
        let mut finished_count = 0_u64;
        for row in rows {
            let (status_raw, count, avg_ms) =
                row.map_err(|err| LogStoreError::Db(err.to_string()))?;
            let count = u64::try_from(count).unwrap_or(0);
            stats.total += count;
            match ExecutionStatus::from_db_str(&status_raw) {
                Some(ExecutionStatus::Pending) => stats.pending = count,
                Some(ExecutionStatus::Running) => stats.running = count,
                Some(ExecutionStatus::Succeeded) => stats.succeeded = count,
                Some(ExecutionStatus::Failed) => stats.failed = count,
                Some(ExecutionStatus::TimedOut) => stats.timed_out = count,
                Some(ExecutionStatus::Cancelled) => stats.cancelled = count,
                None => {}
            }
            if let Some(avg_ms) = avg_ms {
                finished_avg_weighted += avg_ms * count as f64;
                finished_count += count;
            }
        }
        stats.avg_execution_time_ms =
            (finished_count > 0).then(|| finished_avg_weighted / finished_count as f64);
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteLogStore {
        SqliteLogStore::open_in_memory().expect("in-memory store")
    }

    fn new_log(id: &str) -> NewExecutionLog {
        NewExecutionLog {
            id: id.to_string(),
            script_id: "script-1".to_string(),
            tenant_id: "tenant-1".to_string(),
            trigger_kind: "api".to_string(),
            created_at: 1_000,
            security_flags: vec![],
        }
    }

    #[test]
    fn create_then_get_round_trips() {
        let store = store();
        store.create(new_log("exec-1")).unwrap();
        let log = store.get("exec-1").unwrap().expect("row exists");
        assert_eq!(log.status, ExecutionStatus::Pending);
        assert_eq!(log.script_id, "script-1");
        assert!(log.output_lines.is_empty());
    }

    #[test]
    fn duplicate_create_is_rejected() {
        let store = store();
        store.create(new_log("exec-1")).unwrap();
        let err = store.create(new_log("exec-1")).unwrap_err();
        assert!(matches!(err, LogStoreError::Invalid(_)));
    }

    #[test]
    fn legal_lifecycle_transitions_succeed() {
        let store = store();
        store.create(new_log("exec-1")).unwrap();
        store
            .transition("exec-1", ExecutionStatus::Pending, TransitionUpdate::Start { started_at: 1_100 })
            .unwrap();
        store
            .transition(
                "exec-1",
                ExecutionStatus::Running,
                TransitionUpdate::Finish {
                    status: ExecutionStatus::Succeeded,
                    finished_at: 1_200,
                    execution_time_ms: 100,
                    memory_used_bytes: 4_096,
                    result: Some(serde_json::json!({"ok": true})),
                    error: None,
                    output_lines: vec!["line 1".to_string()],
                    security_flags: vec![],
                },
            )
            .unwrap();
        let log = store.get("exec-1").unwrap().unwrap();
        assert_eq!(log.status, ExecutionStatus::Succeeded);
        assert_eq!(log.execution_time_ms, Some(100));
        assert_eq!(log.output_lines, vec!["line 1".to_string()]);
    }

    #[test]
    fn cas_mismatch_is_reported_precisely() {
        let store = store();
        store.create(new_log("exec-1")).unwrap();
        store
            .transition("exec-1", ExecutionStatus::Pending, TransitionUpdate::Start { started_at: 1_100 })
            .unwrap();
        let err = store
            .transition("exec-1", ExecutionStatus::Pending, TransitionUpdate::Start { started_at: 1_150 })
            .unwrap_err();
        match err {
            LogStoreError::CasMismatch { expected, actual, .. } => {
                assert_eq!(expected, "pending");
                assert_eq!(actual, "running");
            }
            other => panic!("expected CasMismatch, got {other:?}"),
        }
    }

    #[test]
    fn terminal_rows_reject_further_transitions() {
        let store = store();
        store.create(new_log("exec-1")).unwrap();
        store
            .transition("exec-1", ExecutionStatus::Pending, TransitionUpdate::Start { started_at: 1_100 })
            .unwrap();
        store
            .transition(
                "exec-1",
                ExecutionStatus::Running,
                TransitionUpdate::Finish {
                    status: ExecutionStatus::Failed,
                    finished_at: 1_200,
                    execution_time_ms: 100,
                    memory_used_bytes: 0,
                    result: None,
                    error: Some("boom".to_string()),
                    output_lines: vec![],
                    security_flags: vec![],
                },
            )
            .unwrap();
        let err = store
            .transition(
                "exec-1",
                ExecutionStatus::Failed,
                TransitionUpdate::Start { started_at: 1_300 },
            )
            .unwrap_err();
        assert!(matches!(err, LogStoreError::Invalid(_)));
    }

    #[test]
    fn security_flags_round_trip_through_create() {
        let store = store();
        store
            .create(NewExecutionLog {
                security_flags: vec![SecurityFlag {
                    severity: crate::types::FlagSeverity::Low,
                    kind: "forbidden_property".to_string(),
                    message: "access to forbidden property `.prototype`".to_string(),
                    context: serde_json::json!({"offset": 42}),
                    at: 1_000,
                }],
                ..new_log("exec-1")
            })
            .unwrap();
        let log = store.get("exec-1").unwrap().unwrap();
        assert_eq!(log.security_flags.len(), 1);
        assert_eq!(log.security_flags[0].kind, "forbidden_property");
    }

    #[test]
    fn rejected_before_dispatch_goes_straight_from_pending_to_terminal() {
        let store = store();
        store.create(new_log("exec-1")).unwrap();
        store
            .transition(
                "exec-1",
                ExecutionStatus::Pending,
                TransitionUpdate::Finish {
                    status: ExecutionStatus::Failed,
                    finished_at: 1_050,
                    execution_time_ms: 0,
                    memory_used_bytes: 0,
                    result: None,
                    error: Some("quota exceeded".to_string()),
                    output_lines: vec![],
                    security_flags: vec![],
                },
            )
            .unwrap();
        let log = store.get("exec-1").unwrap().unwrap();
        assert_eq!(log.status, ExecutionStatus::Failed);
        assert!(log.started_at.is_none());
    }

    #[test]
    fn cancelled_is_a_terminal_status() {
        let store = store();
        store.create(new_log("exec-1")).unwrap();
        store
            .transition("exec-1", ExecutionStatus::Pending, TransitionUpdate::Start { started_at: 1_100 })
            .unwrap();
        store
            .transition(
                "exec-1",
                ExecutionStatus::Running,
                TransitionUpdate::Finish {
                    status: ExecutionStatus::Cancelled,
                    finished_at: 1_200,
                    execution_time_ms: 100,
                    memory_used_bytes: 0,
                    result: None,
                    error: Some("cancelled by caller".to_string()),
                    output_lines: vec![],
                    security_flags: vec![],
                },
            )
            .unwrap();
        let err = store
            .transition("exec-1", ExecutionStatus::Cancelled, TransitionUpdate::Start { started_at: 1_300 })
            .unwrap_err();
        assert!(matches!(err, LogStoreError::Invalid(_)));
    }

    #[test]
    fn transition_on_missing_row_is_not_found() {
        let store = store();
        let err = store
            .transition("nonexistent", ExecutionStatus::Pending, TransitionUpdate::Start { started_at: 1 })
            .unwrap_err();
        assert!(matches!(err, LogStoreError::NotFound(_)));
    }

    #[test]
    fn list_by_script_orders_newest_first() {
        let store = store();
        store.create(NewExecutionLog { created_at: 1_000, ..new_log("exec-1") }).unwrap();
        store.create(NewExecutionLog { created_at: 2_000, ..new_log("exec-2") }).unwrap();
        let rows = store.list_by_script("script-1", 10).unwrap();
        assert_eq!(rows.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), vec!["exec-2", "exec-1"]);
    }

    #[test]
    fn list_by_tenant_respects_time_range() {
        let store = store();
        store.create(NewExecutionLog { created_at: 500, ..new_log("exec-1") }).unwrap();
        store.create(NewExecutionLog { created_at: 1_500, ..new_log("exec-2") }).unwrap();
        let rows = store.list_by_tenant("tenant-1", TimeRange { since: 1_000, until: 2_000 }).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "exec-2");
    }

    #[test]
    fn aggregate_by_tenant_counts_by_status() {
        let store = store();
        store.create(new_log("exec-1")).unwrap();
        store.create(new_log("exec-2")).unwrap();
        store
            .transition("exec-2", ExecutionStatus::Pending, TransitionUpdate::Start { started_at: 1_100 })
            .unwrap();
        let stats = store
            .aggregate_by_tenant("tenant-1", TimeRange { since: 0, until: i64::MAX })
            .unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.running, 1);
    }
}
