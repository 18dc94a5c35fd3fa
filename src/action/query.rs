use std::collections::BTreeMap;
use std::sync::Arc;

use crate::driver::ConnectionDriver;
use crate::engine::{Engine, Reply};
use crate::error::{ErrorBox, FanoutError, Settled};
use crate::filter::Filter;
use crate::location::Location;
use crate::results::{ColumnIndex, QueryResult};
use crate::types::ActionKind;

use super::{ActionCore, DbAction};

/// Opens a result set on one or more Locations; rows are read through [`QueryResult`].
pub struct QueryAction<D: ConnectionDriver> {
    core: ActionCore<D>,
    columns: BTreeMap<Location, Arc<ColumnIndex>>,
    result_open: bool,
}

impl<D: ConnectionDriver> QueryAction<D> {
    pub(crate) fn new(engine: Arc<Engine<D>>, errors: Arc<ErrorBox>) -> Self {
        Self {
            core: ActionCore::new(engine, errors),
            columns: BTreeMap::new(),
            result_open: false,
        }
    }

    /// Run the same query on every Location.
    ///
    /// # Errors
    ///
    /// Query failures of any Location (raise mode).
    pub fn run(&mut self, filter: &Filter) -> Result<bool, FanoutError> {
        let works = self.core.works_for_all(filter);
        self.run_many(works)
    }

    /// Run a query on one Location.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown Location, or the query failure (raise mode).
    pub fn run_at(&mut self, filter: &Filter, location: &Location) -> Result<bool, FanoutError> {
        let result = self
            .core
            .single(ActionKind::Query, filter, location, None)
            .and_then(|reply| self.open(location.clone(), reply));
        self.core.errors().settle_flag(result)
    }

    /// Run a different query per Location.
    ///
    /// # Errors
    ///
    /// See [`QueryAction::run`].
    pub fn run_many(&mut self, works: BTreeMap<Location, Filter>) -> Result<bool, FanoutError> {
        let result = self.try_run_many(works);
        self.core.errors().settle_flag(result)
    }

    /// Reader over the open result sets.
    ///
    /// # Errors
    ///
    /// `CodingError::CodeSequence` when no query has been run yet (raise mode).
    pub fn get_result(&self) -> Settled<QueryResult<'_, D>> {
        let result = if self.result_open {
            Ok(QueryResult::new(self))
        } else {
            Err(FanoutError::sequence("get_result called before a query was run"))
        };
        self.core.errors().settle(result)
    }

    #[must_use]
    pub fn is_result_open(&self) -> bool {
        self.result_open
    }

    /// Column index captured when the query was opened on `location`.
    #[must_use]
    pub fn columns_at(&self, location: &Location) -> Option<&Arc<ColumnIndex>> {
        self.columns.get(location)
    }

    pub(crate) fn engine(&self) -> &Engine<D> {
        self.core.engine()
    }

    pub(crate) fn errors(&self) -> &Arc<ErrorBox> {
        self.core.errors()
    }

    /// Locations with an open result set, in facade order.
    pub(crate) fn open_locations(&self) -> Vec<Location> {
        self.core
            .locations()
            .iter()
            .filter(|location| self.columns.contains_key(*location))
            .cloned()
            .collect()
    }

    pub(crate) fn try_run_many(&mut self, works: BTreeMap<Location, Filter>) -> Result<(), FanoutError> {
        let replies = self.core.round(ActionKind::Query, works, None)?;
        for (location, reply) in replies {
            self.open(location, reply)?;
        }
        Ok(())
    }

    fn open(&mut self, location: Location, reply: Reply) -> Result<(), FanoutError> {
        let Reply::Columns(columns) = reply else {
            return Err(FanoutError::sequence(format!(
                "query on {location} did not open a result set"
            )));
        };
        self.columns.insert(location, columns);
        self.result_open = true;
        Ok(())
    }

    fn try_end(&mut self) -> Result<(), FanoutError> {
        // a partly failed query still leaves results open where it succeeded
        if self.result_open || self.core.has_touched() {
            self.core.on_end_targets(ActionKind::CloseResult)?;
            self.result_open = false;
            self.columns.clear();
        }
        self.core.commit_and_finish()
    }
}

impl<D: ConnectionDriver> DbAction for QueryAction<D> {
    fn end_action(&mut self) -> Result<bool, FanoutError> {
        let result = self.try_end();
        self.core.errors().settle_flag(result)
    }

    fn is_finished(&self) -> bool {
        self.core.is_finished()
    }
}
