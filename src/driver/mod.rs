// Connection drivers.
//
// - `ConnectionDriver`: the primitive operations the engine needs from a backend
// - `sqlite`: rusqlite-backed driver (feature `sqlite`)

use std::fmt;

use crate::error::ErrorKind;
use crate::location::Location;
use crate::results::ColumnIndex;
use crate::types::{Dialect, RowValues};

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteDriver, SqliteHandle};

/// Failure reported by a driver primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverError {
    /// Native error code (MySQL errno, DB2 SQLCODE, `SQLite` extended code, ...).
    pub code: i64,
    pub message: String,
    /// Overrides the kind the engine would derive from the operation.
    pub kind: Option<ErrorKind>,
}

impl DriverError {
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            kind: None,
        }
    }

    #[must_use]
    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl std::error::Error for DriverError {}

/// Primitive operations against one physical connection.
///
/// Every method receives the handle created by [`ConnectionDriver::new_handle`] for the
/// Location it is called with. The engine guarantees that a handle is only used by one
/// thread at a time: the Location's worker, or the caller during a synchronous dispatch.
pub trait ConnectionDriver: Send + Sync + 'static {
    /// Per-connection state (connection, open result, buffers). Never inspected by the engine.
    type Handle: Send + 'static;

    fn dialect(&self) -> Dialect;

    /// Allocate an unconnected handle for `location`.
    fn new_handle(&self, location: &Location) -> Self::Handle;

    /// Runs on each worker thread before it takes its first command.
    fn init_thread(&self) {}

    /// Runs on each worker thread after its last command.
    fn uninit_thread(&self) {}

    /// # Errors
    /// Driver-specific connection failures.
    fn connect(&self, handle: &mut Self::Handle, location: &Location) -> Result<(), DriverError>;

    /// # Errors
    /// Driver-specific teardown failures.
    fn disconnect(&self, handle: &mut Self::Handle, location: &Location)
    -> Result<(), DriverError>;

    /// Run a query and open its result set.
    ///
    /// # Errors
    /// Statement preparation or execution failures.
    fn query(
        &self,
        handle: &mut Self::Handle,
        location: &Location,
        sql: &str,
    ) -> Result<ColumnIndex, DriverError>;

    /// Next row of the open result set, `None` at end of data.
    ///
    /// # Errors
    /// Fetch failures.
    fn fetch(
        &self,
        handle: &mut Self::Handle,
        location: &Location,
    ) -> Result<Option<Vec<RowValues>>, DriverError>;

    /// Byte length of every column of the most recently fetched row.
    ///
    /// # Errors
    /// Fails when no row is current.
    fn column_lengths(
        &self,
        handle: &mut Self::Handle,
        location: &Location,
    ) -> Result<Vec<usize>, DriverError>;

    /// # Errors
    /// Driver-specific failures releasing the result set.
    fn close_result(
        &self,
        handle: &mut Self::Handle,
        location: &Location,
    ) -> Result<(), DriverError>;

    /// # Errors
    /// Commit failures.
    fn commit(&self, handle: &mut Self::Handle, location: &Location) -> Result<(), DriverError>;

    /// Rows changed by the last statement.
    ///
    /// # Errors
    /// Driver-specific failures.
    fn affected_rows(
        &self,
        handle: &mut Self::Handle,
        location: &Location,
    ) -> Result<u64, DriverError>;

    /// Run a row-changing statement and return the affected row count.
    ///
    /// # Errors
    /// Statement failures.
    fn modify(
        &self,
        handle: &mut Self::Handle,
        location: &Location,
        sql: &str,
    ) -> Result<u64, DriverError>;

    /// # Errors
    /// Statement failures.
    fn delete(
        &self,
        handle: &mut Self::Handle,
        location: &Location,
        sql: &str,
    ) -> Result<u64, DriverError> {
        self.modify(handle, location, sql)
    }

    /// # Errors
    /// Statement failures.
    fn update(
        &self,
        handle: &mut Self::Handle,
        location: &Location,
        sql: &str,
    ) -> Result<u64, DriverError> {
        self.modify(handle, location, sql)
    }

    /// # Errors
    /// Statement failures.
    fn truncate(
        &self,
        handle: &mut Self::Handle,
        location: &Location,
        sql: &str,
    ) -> Result<u64, DriverError> {
        self.modify(handle, location, sql)
    }

    /// # Errors
    /// Statement failures; duplicate keys are recognised from the native code.
    fn insert(
        &self,
        handle: &mut Self::Handle,
        location: &Location,
        sql: &str,
    ) -> Result<u64, DriverError> {
        self.modify(handle, location, sql)
    }

    /// Run any statement and return the driver's raw status code.
    ///
    /// # Errors
    /// Statement failures.
    fn execute(
        &self,
        handle: &mut Self::Handle,
        location: &Location,
        sql: &str,
    ) -> Result<i64, DriverError>;

    /// # Errors
    /// Only drivers that escape through the server can fail.
    fn escape_string(
        &self,
        _handle: &mut Self::Handle,
        _location: &Location,
        raw: &[u8],
    ) -> Result<String, DriverError> {
        Ok(self.dialect().escape_literal(raw))
    }
}
