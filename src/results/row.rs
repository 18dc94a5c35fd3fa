use std::collections::HashMap;
use std::sync::Arc;

use crate::error::FanoutError;
use crate::types::RowValues;

/// Column name to position map captured once per Location when a query is opened.
///
/// Names are normalized (trimmed, lowercased) so lookups ignore case and padding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnIndex {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl ColumnIndex {
    #[must_use]
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<String> = names
            .into_iter()
            .map(|name| Self::normalize(name.as_ref()))
            .collect();
        let mut positions = HashMap::with_capacity(names.len());
        for (idx, name) in names.iter().enumerate() {
            // first occurrence wins for duplicated names
            positions.entry(name.clone()).or_insert(idx);
        }
        Self { names, positions }
    }

    #[must_use]
    pub fn normalize(name: &str) -> String {
        name.trim().to_lowercase()
    }

    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(&Self::normalize(name)).copied()
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// A fetched row, or the end-of-data marker when it carries no cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<ColumnIndex>,
    cells: Option<Vec<RowValues>>,
}

impl Row {
    /// Create a row sharing the column index of its result set
    ///
    /// # Arguments
    ///
    /// * `columns` - The column index captured when the query was opened
    /// * `cells` - The values for this row
    #[must_use]
    pub fn new(columns: Arc<ColumnIndex>, cells: Vec<RowValues>) -> Self {
        Self {
            columns,
            cells: Some(cells),
        }
    }

    /// The empty row returned once data is exhausted.
    #[must_use]
    pub fn end() -> Self {
        Self {
            columns: Arc::default(),
            cells: None,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_none()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.as_ref().map_or(0, Vec::len)
    }

    #[must_use]
    pub fn cells(&self) -> &[RowValues] {
        self.cells.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn columns(&self) -> &ColumnIndex {
        &self.columns
    }

    /// Get a value by column name
    ///
    /// # Errors
    ///
    /// Returns `FanoutError::NotFound` listing the available columns when the name is unknown.
    pub fn get(&self, column: &str) -> Result<&RowValues, FanoutError> {
        self.columns
            .position(column)
            .and_then(|idx| self.get_by_index(idx))
            .ok_or_else(|| {
                FanoutError::not_found(
                    "column",
                    format!(
                        "[{}] among [{}]",
                        ColumnIndex::normalize(column),
                        self.columns.names().join(",")
                    ),
                )
            })
    }

    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&RowValues> {
        self.cells.as_ref().and_then(|cells| cells.get(index))
    }
}
