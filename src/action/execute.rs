use std::collections::BTreeMap;
use std::sync::Arc;

use crate::driver::ConnectionDriver;
use crate::engine::{AffectedRowRecorder, Engine, Recorders};
use crate::error::{ErrorBox, FanoutError, Settled};
use crate::filter::Filter;
use crate::location::Location;
use crate::results::ExecuteResult;
use crate::types::ActionKind;

use super::{ActionCore, DbAction, affected_rows};

/// Row-changing statements (insert, update, delete, truncate or anything else) with
/// automatic commits every `commit_limit` affected rows per Location.
pub struct ExecuteAction<D: ConnectionDriver> {
    core: ActionCore<D>,
    kind: ActionKind,
    commit_limit: u64,
    recorders: Recorders,
}

impl<D: ConnectionDriver> ExecuteAction<D> {
    pub(crate) fn new(
        engine: Arc<Engine<D>>,
        errors: Arc<ErrorBox>,
        kind: ActionKind,
        commit_limit: u64,
    ) -> Self {
        let recorders = engine
            .locations()
            .iter()
            .map(|location| (location.clone(), AffectedRowRecorder::new(commit_limit)))
            .collect();
        Self {
            core: ActionCore::new(engine, errors),
            kind,
            commit_limit,
            recorders,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    #[must_use]
    pub fn commit_limit(&self) -> u64 {
        self.commit_limit
    }

    /// Run the same statement on every Location.
    ///
    /// # Errors
    ///
    /// Driver failures of any Location, or a work/result count mismatch (raise mode).
    pub fn run(&mut self, filter: &Filter) -> Settled<BTreeMap<Location, u64>> {
        let result = self.try_run(filter);
        self.core.errors().settle(result)
    }

    /// Run a statement on one Location, inline on the calling thread.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown Location, or the driver failure (raise mode).
    pub fn run_at(&mut self, filter: &Filter, location: &Location) -> Settled<u64> {
        let result = self.try_run_at(filter, location);
        self.core.errors().settle(result)
    }

    /// Run a different statement per Location.
    ///
    /// # Errors
    ///
    /// See [`ExecuteAction::run`].
    pub fn run_many(&mut self, works: BTreeMap<Location, Filter>) -> Settled<BTreeMap<Location, u64>> {
        let result = self.try_run_many(works);
        self.core.errors().settle(result)
    }

    /// Cumulative affected rows of every Location since the action was created.
    #[must_use]
    pub fn get_result(&self) -> ExecuteResult {
        let totals = self
            .recorders
            .iter()
            .map(|(location, recorder)| (location.clone(), recorder.total()))
            .collect();
        ExecuteResult::new(totals, Arc::clone(self.core.errors()))
    }

    /// Rows the connection reports for its most recent statement, per end target (the
    /// touched Locations, or all of them). Does not add to the running totals.
    ///
    /// # Errors
    ///
    /// Driver failures of any Location (raise mode).
    pub fn last_affected_rows(&self) -> Settled<BTreeMap<Location, u64>> {
        let result = self
            .core
            .on_end_targets(ActionKind::AffectedRows)
            .map(|replies| affected_rows(&replies));
        self.core.errors().settle(result)
    }

    pub(crate) fn try_run(&mut self, filter: &Filter) -> Result<BTreeMap<Location, u64>, FanoutError> {
        let works = self.core.works_for_all(filter);
        self.try_run_many(works)
    }

    pub(crate) fn try_run_at(
        &mut self,
        filter: &Filter,
        location: &Location,
    ) -> Result<u64, FanoutError> {
        let reply = self
            .core
            .single(self.kind, filter, location, Some(&mut self.recorders))?;
        Ok(reply.affected())
    }

    pub(crate) fn try_run_many(
        &mut self,
        works: BTreeMap<Location, Filter>,
    ) -> Result<BTreeMap<Location, u64>, FanoutError> {
        let replies = self.core.round(self.kind, works, Some(&mut self.recorders))?;
        Ok(affected_rows(&replies))
    }

    pub(crate) fn core(&self) -> &ActionCore<D> {
        &self.core
    }

    pub(crate) fn try_end(&mut self) -> Result<(), FanoutError> {
        self.core.commit_and_finish()
    }
}

impl<D: ConnectionDriver> DbAction for ExecuteAction<D> {
    fn end_action(&mut self) -> Result<bool, FanoutError> {
        let result = self.try_end();
        self.core.errors().settle_flag(result)
    }

    fn is_finished(&self) -> bool {
        self.core.is_finished()
    }
}
