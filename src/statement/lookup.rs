use crate::error::FanoutError;
use crate::location::Location;
use crate::types::Dialect;

use super::{GeneratorState, PrimaryKeySource, StatementGenerator};

/// Metadata query listing the primary-key columns of one table, as `COL_NAME`.
#[derive(Debug, Clone)]
pub struct PrimaryKeyLookup {
    dialect: Dialect,
    state: GeneratorState,
}

impl PrimaryKeyLookup {
    #[must_use]
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            state: GeneratorState::default(),
        }
    }

    /// Lookup statement for `table` on `location`.
    #[must_use]
    pub fn statement_for(dialect: Dialect, location: &Location, table: &str) -> String {
        if table.is_empty() {
            return String::new();
        }
        match dialect {
            Dialect::Mysql => format!(
                "SELECT COLUMN_NAME AS COL_NAME from INFORMATION_SCHEMA.COLUMNS WHERE \
                 COLUMN_KEY = 'PRI' AND TABLE_NAME = '{table}' AND table_schema = '{}'",
                location.db_id
            ),
            Dialect::Db2 => {
                let (schema, name) = match table.split_once('.') {
                    Some((schema, name)) => (Some(schema), name),
                    None => (None, table),
                };
                let mut statement = format!(
                    "SELECT b.NAME AS COL_NAME FROM SYSIBM.SYSTABLES a, SYSIBM.SYSCOLUMNS b \
                     WHERE a.NAME = b.TBNAME AND b.KEYSEQ = 1 AND UPPER(b.TBNAME) = UPPER('{name}')"
                );
                if let Some(schema) = schema {
                    statement.push_str(&format!(" AND UPPER(a.CREATOR) = UPPER('{schema}')"));
                }
                statement
            }
            Dialect::Sqlite => format!(
                "SELECT name AS COL_NAME FROM pragma_table_info('{table}') WHERE pk > 0 ORDER BY pk"
            ),
        }
    }
}

impl StatementGenerator for PrimaryKeyLookup {
    fn state(&self) -> &GeneratorState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut GeneratorState {
        &mut self.state
    }

    /// Only the table matters; a lookup is never incompatible.
    fn makeup_statement(&mut self, _: &[String], table: &str, _: &str, _: bool) -> bool {
        self.state.set_table(table);
        false
    }

    fn form_statement(
        &self,
        location: &Location,
        _keys: &dyn PrimaryKeySource,
    ) -> Result<String, FanoutError> {
        Ok(Self::statement_for(self.dialect, location, self.state.table()))
    }
}
