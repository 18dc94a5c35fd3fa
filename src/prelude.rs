//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::action::{
    BatchAction, DbAction, EscapeStringAction, ExecuteAction, PrimaryKeyAction, QueryAction,
};
pub use crate::config::{TasksOptions, TasksOptionsBuilder};
pub use crate::driver::{ConnectionDriver, DriverError};
pub use crate::error::{
    CodingError, DriverFailure, ErrorKind, FanoutError, PropagationMode, Settled,
};
pub use crate::filter::{BatchFilter, Filter};
pub use crate::location::Location;
pub use crate::results::{ColumnIndex, ExecuteResult, QueryResult, Row};
pub use crate::statement::BatchMode;
pub use crate::tasks::DbTasks;
pub use crate::types::{ActionKind, Dialect, RowValues};
pub use crate::value::Value;

#[cfg(feature = "sqlite")]
pub use crate::driver::SqliteDriver;

#[cfg(any(test, feature = "test-utils"))]
pub use crate::test_utils::ScriptedDriver;
