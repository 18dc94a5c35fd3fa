use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use crate::driver::{ConnectionDriver, DriverError};
use crate::location::Location;
use crate::results::ColumnIndex;
use crate::types::{ActionKind, Dialect, RowValues};

/// One primitive call observed by a [`ScriptedDriver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub kind: ActionKind,
    /// Statement text, escape input, or empty for statement-less primitives.
    pub text: String,
    /// Name of the thread the call ran on.
    pub thread: Option<String>,
}

#[derive(Debug, Clone)]
struct ScriptedResult {
    columns: Vec<String>,
    rows: Vec<Vec<RowValues>>,
}

#[derive(Debug, Clone)]
struct Failure {
    code: i64,
    message: String,
    remaining: Option<usize>,
}

#[derive(Debug, Default)]
struct Script {
    calls: BTreeMap<Location, Vec<Call>>,
    results: HashMap<Location, VecDeque<ScriptedResult>>,
    failures: HashMap<(Location, ActionKind), Failure>,
    delays: HashMap<Location, Duration>,
    affected: HashMap<Location, u64>,
    panics: HashMap<Location, ActionKind>,
}

/// In-process driver for tests: records every call per Location, replays scripted
/// query results and fails on demand.
///
/// Clones share their script, so a test keeps one clone to inspect what the facade did.
/// Row-changing statements report one affected row per `VALUES` tuple unless
/// [`ScriptedDriver::report_rows`] overrides it.
#[derive(Debug, Clone)]
pub struct ScriptedDriver {
    dialect: Dialect,
    script: Arc<Mutex<Script>>,
    threads_started: Arc<AtomicUsize>,
}

/// Per-connection state of a [`ScriptedDriver`].
#[derive(Debug, Default)]
pub struct ScriptedHandle {
    connected: bool,
    pending: Option<VecDeque<Vec<RowValues>>>,
    current: Option<Vec<RowValues>>,
    last_changes: u64,
}

impl ScriptedDriver {
    #[must_use]
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            script: Arc::new(Mutex::new(Script::default())),
            threads_started: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue the result set returned by the next query on `location`. Queries without a
    /// queued result open an empty result set.
    pub fn push_result(&self, location: &Location, columns: &[&str], rows: Vec<Vec<RowValues>>) {
        self.script()
            .results
            .entry(location.clone())
            .or_default()
            .push_back(ScriptedResult {
                columns: columns.iter().map(|name| (*name).to_string()).collect(),
                rows,
            });
    }

    /// Fail every `kind` call on `location` with the native `code`.
    pub fn fail(&self, location: &Location, kind: ActionKind, code: i64, message: &str) {
        self.insert_failure(location, kind, code, message, None);
    }

    /// Fail the next `times` `kind` calls on `location`.
    pub fn fail_times(
        &self,
        location: &Location,
        kind: ActionKind,
        code: i64,
        message: &str,
        times: usize,
    ) {
        self.insert_failure(location, kind, code, message, Some(times));
    }

    fn insert_failure(
        &self,
        location: &Location,
        kind: ActionKind,
        code: i64,
        message: &str,
        remaining: Option<usize>,
    ) {
        self.script().failures.insert(
            (location.clone(), kind),
            Failure {
                code,
                message: message.to_string(),
                remaining,
            },
        );
    }

    pub fn clear_failures(&self) {
        self.script().failures.clear();
    }

    /// Make every call on `location` sleep first, to shuffle completion order.
    pub fn delay(&self, location: &Location, delay: Duration) {
        self.script().delays.insert(location.clone(), delay);
    }

    /// Report `rows` affected rows for every row-changing statement on `location`.
    pub fn report_rows(&self, location: &Location, rows: u64) {
        self.script().affected.insert(location.clone(), rows);
    }

    /// Panic inside the driver on every `kind` call on `location`.
    pub fn panic_on(&self, location: &Location, kind: ActionKind) {
        self.script().panics.insert(location.clone(), kind);
    }

    pub fn clear_panics(&self) {
        self.script().panics.clear();
    }

    /// Every call seen on `location`, in order.
    #[must_use]
    pub fn calls(&self, location: &Location) -> Vec<Call> {
        self.script()
            .calls
            .get(location)
            .cloned()
            .unwrap_or_default()
    }

    /// Text of every `kind` call seen on `location`, in order.
    #[must_use]
    pub fn statements(&self, location: &Location, kind: ActionKind) -> Vec<String> {
        self.calls(location)
            .into_iter()
            .filter(|call| call.kind == kind)
            .map(|call| call.text)
            .collect()
    }

    #[must_use]
    pub fn count(&self, location: &Location, kind: ActionKind) -> usize {
        self.calls(location)
            .iter()
            .filter(|call| call.kind == kind)
            .count()
    }

    /// Worker threads that ran `init_thread`.
    #[must_use]
    pub fn threads_started(&self) -> usize {
        self.threads_started.load(Ordering::SeqCst)
    }

    fn record(&self, location: &Location, kind: ActionKind, text: &str) -> Result<(), DriverError> {
        let (delay, panics) = {
            let mut script = self.script();
            script.calls.entry(location.clone()).or_default().push(Call {
                kind,
                text: text.to_string(),
                thread: thread::current().name().map(str::to_string),
            });
            let key = (location.clone(), kind);
            let failure = match script.failures.get_mut(&key) {
                Some(failure) => {
                    let fired = DriverError::new(failure.code, failure.message.clone());
                    match &mut failure.remaining {
                        Some(0) => None,
                        Some(remaining) => {
                            *remaining -= 1;
                            Some(fired)
                        }
                        None => Some(fired),
                    }
                }
                None => None,
            };
            if let Some(fired) = failure {
                return Err(fired);
            }
            let panics = script.panics.get(location) == Some(&kind);
            (script.delays.get(location).copied(), panics)
        };
        if panics {
            panic!("scripted {kind:?} panic on {location}");
        }
        if let Some(delay) = delay {
            thread::sleep(delay);
        }
        Ok(())
    }

    fn ensure_connected(handle: &ScriptedHandle) -> Result<(), DriverError> {
        if handle.connected {
            Ok(())
        } else {
            Err(DriverError::new(-1, "not connected"))
        }
    }
}

/// One per tuple of a multi-value statement, one for anything else.
fn tuples(sql: &str) -> u64 {
    match sql.find("VALUES") {
        Some(start) => 1 + sql[start..].matches("),(").count() as u64,
        None => 1,
    }
}

impl ConnectionDriver for ScriptedDriver {
    type Handle = ScriptedHandle;

    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn new_handle(&self, _location: &Location) -> ScriptedHandle {
        ScriptedHandle::default()
    }

    fn init_thread(&self) {
        self.threads_started.fetch_add(1, Ordering::SeqCst);
    }

    fn connect(&self, handle: &mut ScriptedHandle, location: &Location) -> Result<(), DriverError> {
        self.record(location, ActionKind::Connect, "")?;
        handle.connected = true;
        Ok(())
    }

    fn disconnect(&self, handle: &mut ScriptedHandle, location: &Location) -> Result<(), DriverError> {
        self.record(location, ActionKind::Disconnect, "")?;
        *handle = ScriptedHandle::default();
        Ok(())
    }

    fn query(
        &self,
        handle: &mut ScriptedHandle,
        location: &Location,
        sql: &str,
    ) -> Result<ColumnIndex, DriverError> {
        Self::ensure_connected(handle)?;
        self.record(location, ActionKind::Query, sql)?;
        let scripted = self
            .script()
            .results
            .get_mut(location)
            .and_then(VecDeque::pop_front)
            .unwrap_or(ScriptedResult {
                columns: Vec::new(),
                rows: Vec::new(),
            });
        handle.pending = Some(scripted.rows.into());
        handle.current = None;
        Ok(ColumnIndex::new(scripted.columns))
    }

    fn fetch(
        &self,
        handle: &mut ScriptedHandle,
        location: &Location,
    ) -> Result<Option<Vec<RowValues>>, DriverError> {
        self.record(location, ActionKind::Fetch, "")?;
        let pending = handle
            .pending
            .as_mut()
            .ok_or_else(|| DriverError::new(-1, "no open result"))?;
        handle.current = pending.pop_front();
        Ok(handle.current.clone())
    }

    fn column_lengths(
        &self,
        handle: &mut ScriptedHandle,
        location: &Location,
    ) -> Result<Vec<usize>, DriverError> {
        self.record(location, ActionKind::ColumnLengths, "")?;
        let current = handle
            .current
            .as_ref()
            .ok_or_else(|| DriverError::new(-1, "no current row"))?;
        Ok(current.iter().map(RowValues::byte_len).collect())
    }

    fn close_result(
        &self,
        handle: &mut ScriptedHandle,
        location: &Location,
    ) -> Result<(), DriverError> {
        self.record(location, ActionKind::CloseResult, "")?;
        handle.pending = None;
        handle.current = None;
        Ok(())
    }

    fn commit(&self, handle: &mut ScriptedHandle, location: &Location) -> Result<(), DriverError> {
        Self::ensure_connected(handle)?;
        self.record(location, ActionKind::Commit, "")
    }

    fn affected_rows(
        &self,
        handle: &mut ScriptedHandle,
        location: &Location,
    ) -> Result<u64, DriverError> {
        self.record(location, ActionKind::AffectedRows, "")?;
        Ok(handle.last_changes)
    }

    fn modify(
        &self,
        handle: &mut ScriptedHandle,
        location: &Location,
        sql: &str,
    ) -> Result<u64, DriverError> {
        Self::ensure_connected(handle)?;
        let reported = self.script().affected.get(location).copied();
        handle.last_changes = reported.unwrap_or_else(|| tuples(sql));
        Ok(handle.last_changes)
    }

    fn delete(
        &self,
        handle: &mut ScriptedHandle,
        location: &Location,
        sql: &str,
    ) -> Result<u64, DriverError> {
        self.record(location, ActionKind::Delete, sql)?;
        self.modify(handle, location, sql)
    }

    fn update(
        &self,
        handle: &mut ScriptedHandle,
        location: &Location,
        sql: &str,
    ) -> Result<u64, DriverError> {
        self.record(location, ActionKind::Update, sql)?;
        self.modify(handle, location, sql)
    }

    fn truncate(
        &self,
        handle: &mut ScriptedHandle,
        location: &Location,
        sql: &str,
    ) -> Result<u64, DriverError> {
        self.record(location, ActionKind::Truncate, sql)?;
        self.modify(handle, location, sql)
    }

    fn insert(
        &self,
        handle: &mut ScriptedHandle,
        location: &Location,
        sql: &str,
    ) -> Result<u64, DriverError> {
        self.record(location, ActionKind::Insert, sql)?;
        self.modify(handle, location, sql)
    }

    fn execute(
        &self,
        handle: &mut ScriptedHandle,
        location: &Location,
        sql: &str,
    ) -> Result<i64, DriverError> {
        Self::ensure_connected(handle)?;
        self.record(location, ActionKind::Execute, sql)?;
        Ok(0)
    }

    fn escape_string(
        &self,
        _handle: &mut ScriptedHandle,
        location: &Location,
        raw: &[u8],
    ) -> Result<String, DriverError> {
        self.record(location, ActionKind::Escape, &String::from_utf8_lossy(raw))?;
        Ok(self.dialect.escape_literal(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_values_tuples() {
        assert_eq!(tuples("INSERT INTO t (id) VALUES (1),(2),(3)"), 3);
        assert_eq!(tuples("DELETE FROM t"), 1);
    }

    #[test]
    fn failures_fire_the_requested_number_of_times() {
        let driver = ScriptedDriver::new(Dialect::Mysql);
        let loc = Location::sqlite("a.db");
        let mut handle = driver.new_handle(&loc);
        driver.fail_times(&loc, ActionKind::Connect, 2003, "refused", 1);
        assert!(driver.connect(&mut handle, &loc).is_err());
        assert!(driver.connect(&mut handle, &loc).is_ok());
        assert_eq!(driver.count(&loc, ActionKind::Connect), 2);
    }
}
