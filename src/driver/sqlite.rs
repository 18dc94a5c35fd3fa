use std::collections::VecDeque;

use rusqlite::Connection;
use rusqlite::types::ValueRef;

use crate::error::ErrorKind;
use crate::location::Location;
use crate::results::ColumnIndex;
use crate::types::{Dialect, RowValues};

use super::{ConnectionDriver, DriverError};

/// `SQLite` backend. `Location::db_id` is the database path (or `:memory:`).
///
/// Each connection keeps an explicit transaction open so commits behave like
/// the server backends: nothing is durable until the engine commits.
#[derive(Debug, Clone, Default)]
pub struct SqliteDriver {
    pragmas: Option<String>,
}

impl SqliteDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Statements run right after every connect, e.g. `PRAGMA busy_timeout = 5000;`.
    #[must_use]
    pub fn with_pragmas(mut self, pragmas: impl Into<String>) -> Self {
        self.pragmas = Some(pragmas.into());
        self
    }
}

/// Connection plus the buffered rows of the open result set.
#[derive(Debug, Default)]
pub struct SqliteHandle {
    conn: Option<Connection>,
    pending: VecDeque<Vec<RowValues>>,
    current: Option<Vec<RowValues>>,
    result_open: bool,
    last_changes: u64,
}

impl SqliteHandle {
    fn conn(&mut self) -> Result<&mut Connection, DriverError> {
        self.conn
            .as_mut()
            .ok_or_else(|| DriverError::new(-1, "not connected"))
    }
}

fn driver_error(err: &rusqlite::Error) -> DriverError {
    match err {
        rusqlite::Error::SqliteFailure(inner, _) => {
            DriverError::new(i64::from(inner.extended_code), err.to_string())
        }
        _ => DriverError::new(-1, err.to_string()),
    }
}

fn cell(value: ValueRef<'_>) -> RowValues {
    match value {
        ValueRef::Null => RowValues::Null,
        ValueRef::Integer(i) => RowValues::Int(i),
        ValueRef::Real(f) => RowValues::Float(f),
        ValueRef::Text(bytes) => RowValues::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => RowValues::Blob(bytes.to_vec()),
    }
}

impl ConnectionDriver for SqliteDriver {
    type Handle = SqliteHandle;

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn new_handle(&self, _location: &Location) -> SqliteHandle {
        SqliteHandle::default()
    }

    fn connect(&self, handle: &mut SqliteHandle, location: &Location) -> Result<(), DriverError> {
        if handle.conn.is_some() {
            return Ok(());
        }
        let conn = Connection::open(&location.db_id).map_err(|err| driver_error(&err))?;
        if let Some(pragmas) = &self.pragmas {
            conn.execute_batch(pragmas)
                .map_err(|err| driver_error(&err))?;
        }
        conn.execute_batch("BEGIN").map_err(|err| driver_error(&err))?;
        handle.conn = Some(conn);
        Ok(())
    }

    fn disconnect(&self, handle: &mut SqliteHandle, _location: &Location) -> Result<(), DriverError> {
        handle.pending.clear();
        handle.current = None;
        handle.result_open = false;
        match handle.conn.take() {
            // an open transaction is rolled back on close
            Some(conn) => conn.close().map_err(|(_, err)| driver_error(&err)),
            None => Ok(()),
        }
    }

    fn query(
        &self,
        handle: &mut SqliteHandle,
        _location: &Location,
        sql: &str,
    ) -> Result<ColumnIndex, DriverError> {
        let conn = handle.conn()?;
        let mut stmt = conn.prepare(sql).map_err(|err| driver_error(&err))?;
        let columns = ColumnIndex::new(stmt.column_names());
        let width = columns.len();

        let mut buffered = VecDeque::new();
        let mut rows = stmt.query([]).map_err(|err| driver_error(&err))?;
        while let Some(row) = rows
            .next()
            .map_err(|err| driver_error(&err).with_kind(ErrorKind::QueryOpenFailure))?
        {
            let mut cells = Vec::with_capacity(width);
            for idx in 0..width {
                let value = row
                    .get_ref(idx)
                    .map_err(|err| driver_error(&err).with_kind(ErrorKind::QueryOpenFailure))?;
                cells.push(cell(value));
            }
            buffered.push_back(cells);
        }
        drop(rows);
        drop(stmt);

        handle.pending = buffered;
        handle.current = None;
        handle.result_open = true;
        Ok(columns)
    }

    fn fetch(
        &self,
        handle: &mut SqliteHandle,
        _location: &Location,
    ) -> Result<Option<Vec<RowValues>>, DriverError> {
        if !handle.result_open {
            return Err(DriverError::new(-1, "no open result set"));
        }
        handle.current = handle.pending.pop_front();
        Ok(handle.current.clone())
    }

    fn column_lengths(
        &self,
        handle: &mut SqliteHandle,
        _location: &Location,
    ) -> Result<Vec<usize>, DriverError> {
        handle
            .current
            .as_ref()
            .map(|cells| cells.iter().map(RowValues::byte_len).collect())
            .ok_or_else(|| DriverError::new(-1, "no current row"))
    }

    fn close_result(&self, handle: &mut SqliteHandle, _location: &Location) -> Result<(), DriverError> {
        handle.pending.clear();
        handle.current = None;
        handle.result_open = false;
        Ok(())
    }

    fn commit(&self, handle: &mut SqliteHandle, _location: &Location) -> Result<(), DriverError> {
        let conn = handle.conn()?;
        if !conn.is_autocommit() {
            conn.execute_batch("COMMIT").map_err(|err| driver_error(&err))?;
        }
        conn.execute_batch("BEGIN").map_err(|err| driver_error(&err))
    }

    fn affected_rows(&self, handle: &mut SqliteHandle, _location: &Location) -> Result<u64, DriverError> {
        Ok(handle.last_changes)
    }

    fn modify(
        &self,
        handle: &mut SqliteHandle,
        _location: &Location,
        sql: &str,
    ) -> Result<u64, DriverError> {
        let changed = handle
            .conn()?
            .execute(sql, [])
            .map_err(|err| driver_error(&err))?;
        handle.last_changes = u64::try_from(changed).unwrap_or(u64::MAX);
        Ok(handle.last_changes)
    }

    fn execute(
        &self,
        handle: &mut SqliteHandle,
        _location: &Location,
        sql: &str,
    ) -> Result<i64, DriverError> {
        handle
            .conn()?
            .execute_batch(sql)
            .map_err(|err| driver_error(&err))?;
        Ok(0)
    }
}
