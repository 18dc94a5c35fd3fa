// Statement generation for batch actions.
//
// - `insert`: multi-value INSERT / REPLACE / INSERT IGNORE style statements
// - `db2`: MERGE-based replace and insert-ignore for DB2
// - `lookup`: primary-key metadata queries per dialect
// - `primary_keys`: process-wide cache of primary keys keyed by Location and table

use std::fmt;
use std::sync::Arc;

use crate::error::FanoutError;
use crate::location::Location;
use crate::types::Dialect;

pub mod db2;
pub mod insert;
pub mod lookup;
pub mod primary_keys;

pub use db2::Db2Merge;
pub use insert::MultiValueInsert;
pub use lookup::PrimaryKeyLookup;
pub use primary_keys::{CachedPrimaryKeys, PrimaryKeySource};

/// What a batch action does with rows that collide with existing keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchMode {
    /// Plain insert, duplicates fail.
    Insert,
    /// Overwrite existing rows.
    Replace,
    /// Keep existing rows, drop the new ones.
    InsertIgnore,
}

/// Buffered content shared by every generator.
///
/// All buffered tuples share one table and one column list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratorState {
    table: String,
    columns: Vec<String>,
    column_list: String,
    values: String,
    has_value: bool,
    clear_all: bool,
}

impl GeneratorState {
    /// Buffer one row. Returns `true` when the row is incompatible with what is
    /// buffered; the caller must flush and submit the row again.
    pub fn makeup(
        &mut self,
        columns: &[String],
        table: &str,
        values: &str,
        force_check: bool,
    ) -> bool {
        self.clear_all = false;

        if columns.is_empty() || values.is_empty() || table.is_empty() {
            return false;
        }

        if !self.column_list.is_empty()
            && (columns.len() != self.columns.len() || self.table != table)
        {
            self.clear_all = true;
            return true;
        }

        if force_check || self.column_list.is_empty() {
            let new_list = columns.join(",");
            if !self.column_list.is_empty() && new_list != self.column_list {
                self.clear_all = true;
                return true;
            }
            self.column_list = new_list;
        }

        self.table = table.to_string();
        if self.columns.is_empty() {
            self.columns = columns.to_vec();
        }

        if self.has_value {
            self.values.push(',');
        }
        self.values.push('(');
        self.values.push_str(values);
        self.values.push(')');
        self.has_value = true;
        false
    }

    /// Drop buffered tuples; table and columns go too after an incompatible row.
    pub fn clear(&mut self) {
        self.values.clear();
        self.has_value = false;
        if self.clear_all {
            self.table.clear();
            self.columns.clear();
            self.column_list.clear();
        }
    }

    pub fn set_table(&mut self, table: &str) {
        self.table = table.to_string();
    }

    #[must_use]
    pub fn has_value(&self) -> bool {
        self.has_value
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn column_list(&self) -> &str {
        &self.column_list
    }

    /// Buffered tuples, e.g. `(1,'a'),(2,'b')`.
    #[must_use]
    pub fn values(&self) -> &str {
        &self.values
    }

    /// `(prefix.c1,prefix.c2)` over the buffered columns.
    #[must_use]
    pub fn qualified_columns(&self, prefix: &str) -> String {
        let joined = self
            .columns
            .iter()
            .map(|column| format!("{prefix}.{column}"))
            .collect::<Vec<_>>()
            .join(",");
        format!("({joined})")
    }
}

/// Per-dialect accumulator that turns repeated row submissions into one statement.
pub trait StatementGenerator: Send + fmt::Debug {
    fn state(&self) -> &GeneratorState;

    fn state_mut(&mut self) -> &mut GeneratorState;

    /// See [`GeneratorState::makeup`].
    fn makeup_statement(
        &mut self,
        columns: &[String],
        table: &str,
        values: &str,
        force_check: bool,
    ) -> bool {
        self.state_mut().makeup(columns, table, values, force_check)
    }

    /// Render the buffered content for one Location. Empty when nothing is buffered.
    ///
    /// # Errors
    ///
    /// Generators that need metadata (primary keys) propagate lookup failures.
    fn form_statement(
        &self,
        location: &Location,
        keys: &dyn PrimaryKeySource,
    ) -> Result<String, FanoutError>;

    fn clear_content(&mut self) {
        self.state_mut().clear();
    }
}

/// Generator used by batch actions for a dialect and mode.
#[must_use]
pub fn batch_generator(dialect: Dialect, mode: BatchMode) -> Box<dyn StatementGenerator> {
    match (dialect, mode) {
        (_, BatchMode::Insert) => Box::new(MultiValueInsert::new("INSERT INTO")),
        (Dialect::Mysql, BatchMode::Replace) => Box::new(MultiValueInsert::new("REPLACE INTO")),
        (Dialect::Mysql, BatchMode::InsertIgnore) => {
            Box::new(MultiValueInsert::new("INSERT IGNORE INTO"))
        }
        (Dialect::Sqlite, BatchMode::Replace) => {
            Box::new(MultiValueInsert::new("INSERT OR REPLACE INTO"))
        }
        (Dialect::Sqlite, BatchMode::InsertIgnore) => {
            Box::new(MultiValueInsert::new("INSERT OR IGNORE INTO"))
        }
        (Dialect::Db2, BatchMode::Replace) => Box::new(Db2Merge::replace()),
        (Dialect::Db2, BatchMode::InsertIgnore) => Box::new(Db2Merge::insert_ignore()),
    }
}

/// Keys source for generators that never need metadata.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPrimaryKeys;

impl PrimaryKeySource for NoPrimaryKeys {
    fn primary_keys(&self, _: &Location, table: &str) -> Result<Arc<Vec<String>>, FanoutError> {
        Err(FanoutError::not_found("primary key", table))
    }
}
