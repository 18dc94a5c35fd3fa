use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::driver::{ConnectionDriver, DriverError};
use crate::error::{DriverFailure, ErrorKind};
use crate::filter::Filter;
use crate::location::Location;
use crate::types::ActionKind;

use super::channel::{Command, Completion, Reply};
use super::commit::AffectedRowRecorder;

pub(super) fn lock_handle<'a, H>(handle: &'a Mutex<H>, location: &Location) -> MutexGuard<'a, H> {
    handle.lock().unwrap_or_else(|poisoned| {
        tracing::warn!(%location, "recovering poisoned connection handle");
        poisoned.into_inner()
    })
}

pub(super) fn run_worker<D: ConnectionDriver>(
    driver: &D,
    location: &Location,
    handle: &Arc<Mutex<D::Handle>>,
    receiver: &Receiver<Command>,
    completions: &Sender<Completion>,
) {
    driver.init_thread();
    tracing::debug!(%location, "worker started");

    while let Ok(command) = receiver.recv() {
        match command {
            Command::Shutdown => break,
            Command::Run(mut item) => {
                // one completion per pushed item, driver panics included
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    let mut guard = lock_handle(handle, location);
                    perform(
                        driver,
                        &mut guard,
                        &item.location,
                        item.kind,
                        &item.filter,
                        item.recorder.as_mut(),
                    )
                }))
                .unwrap_or_else(|_| {
                    tracing::warn!(%location, kind = ?item.kind, "driver panicked on worker");
                    Err(DriverFailure {
                        kind: item.kind.failure_kind(),
                        location: item.location.clone(),
                        message: "driver panicked".into(),
                        code: -1,
                        statement: None,
                    })
                });
                let _ = completions.send(Completion {
                    location: item.location,
                    outcome,
                    recorder: item.recorder,
                });
            }
        }
    }

    driver.uninit_thread();
    tracing::debug!(%location, "worker stopped");
}

/// Run one primitive against a handle. Mutations feed the recorder and commit on the
/// same connection when a threshold is crossed.
pub(super) fn perform<D: ConnectionDriver>(
    driver: &D,
    handle: &mut D::Handle,
    location: &Location,
    kind: ActionKind,
    filter: &Filter,
    recorder: Option<&mut AffectedRowRecorder>,
) -> Result<Reply, DriverFailure> {
    let sql = filter.sql();
    let result = match kind {
        ActionKind::Connect => driver.connect(handle, location).map(|()| Reply::Done),
        ActionKind::Disconnect => driver.disconnect(handle, location).map(|()| Reply::Done),
        ActionKind::Query => driver
            .query(handle, location, &sql)
            .map(|columns| Reply::Columns(Arc::new(columns))),
        ActionKind::Fetch => driver.fetch(handle, location).map(Reply::Row),
        ActionKind::ColumnLengths => driver.column_lengths(handle, location).map(Reply::Lengths),
        ActionKind::CloseResult => driver.close_result(handle, location).map(|()| Reply::Done),
        ActionKind::Commit => driver.commit(handle, location).map(|()| Reply::Done),
        ActionKind::AffectedRows => driver.affected_rows(handle, location).map(Reply::Rows),
        ActionKind::Delete => driver.delete(handle, location, &sql).map(Reply::Rows),
        ActionKind::Update => driver.update(handle, location, &sql).map(Reply::Rows),
        ActionKind::Truncate => driver.truncate(handle, location, &sql).map(Reply::Rows),
        ActionKind::Insert => driver.insert(handle, location, &sql).map(Reply::Rows),
        ActionKind::Execute => driver.execute(handle, location, &sql).map(Reply::Status),
        ActionKind::Escape => driver
            .escape_string(handle, location, filter.content())
            .map(Reply::Escaped),
    };
    let reply = result.map_err(|err| classify(driver, kind, location, filter, err))?;

    if kind.is_mutation()
        && let Some(recorder) = recorder
        // truncate commits even when the backend reports no affected rows
        && (recorder.record(reply.affected()) || kind == ActionKind::Truncate)
    {
        tracing::debug!(%location, total = recorder.total(), ?kind, "committing");
        driver.commit(handle, location).map_err(|err| DriverFailure {
            kind: ErrorKind::CommitFailure,
            location: location.clone(),
            message: err.message,
            code: err.code,
            statement: None,
        })?;
    }
    Ok(reply)
}

fn classify<D: ConnectionDriver>(
    driver: &D,
    kind: ActionKind,
    location: &Location,
    filter: &Filter,
    err: DriverError,
) -> DriverFailure {
    let mut failure_kind = err.kind.unwrap_or_else(|| kind.failure_kind());
    if failure_kind == ErrorKind::InsertFailure && driver.dialect().is_duplicate_key(err.code) {
        failure_kind = ErrorKind::InsertDuplicateKey;
    }
    let carries_statement = kind.is_mutation() || kind == ActionKind::Query;
    DriverFailure {
        kind: failure_kind,
        location: location.clone(),
        message: err.message,
        code: err.code,
        statement: carries_statement.then(|| filter.sql().into_owned()),
    }
}
