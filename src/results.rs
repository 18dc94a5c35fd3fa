//! Read-only views handed back by actions: fetched rows and affected-row counts.

pub mod execute;
pub mod query;
pub mod row;

pub use execute::ExecuteResult;
pub use query::QueryResult;
pub use row::{ColumnIndex, Row};
