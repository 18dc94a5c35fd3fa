use std::collections::BTreeMap;
use std::sync::Arc;

use crate::driver::ConnectionDriver;
use crate::engine::Engine;
use crate::error::{ErrorBox, FanoutError, Settled};
use crate::filter::Filter;
use crate::location::Location;
use crate::results::QueryResult;
use crate::statement::{NoPrimaryKeys, PrimaryKeyLookup, StatementGenerator};

use super::{DbAction, QueryAction};

/// Looks up the primary-key columns of a table with each dialect's metadata query.
pub struct PrimaryKeyAction<D: ConnectionDriver> {
    query: QueryAction<D>,
    lookups: BTreeMap<Location, PrimaryKeyLookup>,
}

impl<D: ConnectionDriver> PrimaryKeyAction<D> {
    pub(crate) fn new(engine: Arc<Engine<D>>, errors: Arc<ErrorBox>) -> Self {
        let dialect = engine.dialect();
        let lookups = engine
            .locations()
            .iter()
            .map(|location| (location.clone(), PrimaryKeyLookup::new(dialect)))
            .collect();
        Self {
            query: QueryAction::new(engine, errors),
            lookups,
        }
    }

    /// Open the lookup for `table` on every Location.
    ///
    /// # Errors
    ///
    /// Query failures of any Location (raise mode).
    pub fn lookup(&mut self, table: &str) -> Result<bool, FanoutError> {
        let targets: Vec<Location> = self.lookups.keys().cloned().collect();
        let result = self.try_lookup(table, &targets);
        self.query.errors().settle_flag(result)
    }

    /// Open the lookup for `table` on one Location.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown Location, or the query failure (raise mode).
    pub fn lookup_at(&mut self, table: &str, location: &Location) -> Result<bool, FanoutError> {
        let result = self.try_lookup(table, std::slice::from_ref(location));
        self.query.errors().settle_flag(result)
    }

    /// Rows of the lookup, one `COL_NAME` per key column.
    ///
    /// # Errors
    ///
    /// `CodeSequence` before a lookup was run (raise mode).
    pub fn get_result(&self) -> Settled<QueryResult<'_, D>> {
        self.query.get_result()
    }

    /// Drain the lookup into key column names per Location.
    ///
    /// # Errors
    ///
    /// `CodeSequence` before a lookup was run, or fetch failures (raise mode).
    pub fn keys(&self) -> Settled<BTreeMap<Location, Vec<String>>> {
        let result = self.try_keys();
        self.query.errors().settle(result)
    }

    pub(crate) fn try_lookup(&mut self, table: &str, targets: &[Location]) -> Result<(), FanoutError> {
        let mut works = BTreeMap::new();
        for location in targets {
            let lookup = self
                .lookups
                .get_mut(location)
                .ok_or_else(|| FanoutError::not_found("location", location.to_string()))?;
            lookup.makeup_statement(&[], table, "", false);
            let statement = lookup.form_statement(location, &NoPrimaryKeys)?;
            lookup.clear_content();
            works.insert(location.clone(), Filter::new(statement));
        }
        self.query.try_run_many(works)
    }

    pub(crate) fn try_keys(&self) -> Result<BTreeMap<Location, Vec<String>>, FanoutError> {
        if !self.query.is_result_open() {
            return Err(FanoutError::sequence("keys requested before a lookup was run"));
        }
        let mut reader = QueryResult::new(&self.query);
        let mut keys = BTreeMap::new();
        for location in self.query.open_locations() {
            let mut columns = Vec::new();
            loop {
                let row = reader.try_fetch_at(&location)?;
                if row.is_empty() {
                    break;
                }
                if let Some(name) = row.get("col_name")?.to_text() {
                    columns.push(name);
                }
            }
            keys.insert(location, columns);
        }
        Ok(keys)
    }
}

impl<D: ConnectionDriver> DbAction for PrimaryKeyAction<D> {
    fn end_action(&mut self) -> Result<bool, FanoutError> {
        self.query.end_action()
    }

    fn is_finished(&self) -> bool {
        self.query.is_finished()
    }
}
