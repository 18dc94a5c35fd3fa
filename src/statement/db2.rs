use crate::error::FanoutError;
use crate::location::Location;

use super::{GeneratorState, PrimaryKeySource, StatementGenerator};

/// DB2 has no REPLACE or INSERT IGNORE; both are expressed as a MERGE joined on the primary key.
#[derive(Debug, Clone)]
pub struct Db2Merge {
    update_on_match: bool,
    state: GeneratorState,
}

impl Db2Merge {
    /// Matched rows are overwritten.
    #[must_use]
    pub fn replace() -> Self {
        Self {
            update_on_match: true,
            state: GeneratorState::default(),
        }
    }

    /// Matched rows are left alone.
    #[must_use]
    pub fn insert_ignore() -> Self {
        Self {
            update_on_match: false,
            state: GeneratorState::default(),
        }
    }
}

impl StatementGenerator for Db2Merge {
    fn state(&self) -> &GeneratorState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut GeneratorState {
        &mut self.state
    }

    fn form_statement(
        &self,
        location: &Location,
        keys: &dyn PrimaryKeySource,
    ) -> Result<String, FanoutError> {
        if !self.state.has_value() {
            return Ok(String::new());
        }

        let table = self.state.table();
        let primary_keys = keys.primary_keys(location, table)?;
        // an empty ON () would not parse
        if primary_keys.is_empty() {
            return Err(FanoutError::not_found(
                "primary key",
                format!("table {table} on {location}"),
            ));
        }

        let join = primary_keys
            .iter()
            .map(|key| format!("T.{key}=TMPTABLE.{key}"))
            .collect::<Vec<_>>()
            .join(" AND ");
        let mut statement = format!(
            "MERGE INTO {table} AS T USING ( SELECT * FROM TABLE ( VALUES {}) ) AS TMPTABLE({}) ON ({join})",
            self.state.values(),
            self.state.column_list()
        );
        if self.update_on_match {
            let assignments = self
                .state
                .columns()
                .iter()
                .map(|column| format!("{column} = TMPTABLE.{column}"))
                .collect::<Vec<_>>()
                .join(",");
            statement.push_str(" WHEN MATCHED THEN UPDATE SET ");
            statement.push_str(&assignments);
        }
        statement.push_str(&format!(
            " WHEN NOT MATCHED THEN INSERT ({}) VALUES {}",
            self.state.column_list(),
            self.state.qualified_columns("TMPTABLE")
        ));
        Ok(statement)
    }
}
