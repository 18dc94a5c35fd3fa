//! Helper utilities for testing and development.

use std::sync::Arc;

use crate::results::{ColumnIndex, Row};
use crate::types::RowValues;

pub mod scripted;

pub use scripted::{Call, ScriptedDriver, ScriptedHandle};

/// Create a test row with the given column names and values.
#[must_use]
pub fn create_test_row(column_names: &[&str], values: Vec<RowValues>) -> Row {
    Row::new(Arc::new(ColumnIndex::new(column_names)), values)
}
