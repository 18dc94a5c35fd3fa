use crate::error::FanoutError;
use crate::location::Location;

use super::{GeneratorState, PrimaryKeySource, StatementGenerator};

/// `<verb> t (cols) VALUES (..),(..)` for every dialect that supports multi-row VALUES.
#[derive(Debug, Clone)]
pub struct MultiValueInsert {
    verb: &'static str,
    state: GeneratorState,
}

impl MultiValueInsert {
    /// `verb` is the statement head, e.g. `INSERT INTO` or `REPLACE INTO`.
    #[must_use]
    pub fn new(verb: &'static str) -> Self {
        Self {
            verb,
            state: GeneratorState::default(),
        }
    }

    #[must_use]
    pub fn verb(&self) -> &'static str {
        self.verb
    }
}

impl StatementGenerator for MultiValueInsert {
    fn state(&self) -> &GeneratorState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut GeneratorState {
        &mut self.state
    }

    fn form_statement(
        &self,
        _location: &Location,
        _keys: &dyn PrimaryKeySource,
    ) -> Result<String, FanoutError> {
        if !self.state.has_value() {
            return Ok(String::new());
        }
        Ok(format!(
            "{} {} ({}) VALUES {}",
            self.verb,
            self.state.table(),
            self.state.column_list(),
            self.state.values()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::NoPrimaryKeys;

    #[test]
    fn two_rows_one_statement() -> Result<(), FanoutError> {
        let columns = vec!["id".to_string(), "name".to_string()];
        let mut generator = MultiValueInsert::new("INSERT INTO");
        let loc = Location::sqlite(":memory:");
        assert_eq!(generator.form_statement(&loc, &NoPrimaryKeys)?, "");

        generator.makeup_statement(&columns, "t", "1,'a'", false);
        generator.makeup_statement(&columns, "t", "2,'b'", false);
        assert_eq!(
            generator.form_statement(&loc, &NoPrimaryKeys)?,
            "INSERT INTO t (id,name) VALUES (1,'a'),(2,'b')"
        );
        generator.clear_content();
        assert_eq!(generator.form_statement(&loc, &NoPrimaryKeys)?, "");
        Ok(())
    }
}
