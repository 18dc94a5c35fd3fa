// Actions: stateful handles for one logical operation over the Locations of a facade.
//
// - `execute`: insert/update/delete/truncate/execute with commit thresholds
// - `batch`: multi-value statements flushed every N rows
// - `query`: result sets opened per Location and fetched through `QueryResult`
// - `escape`: escaping raw bytes with each connection's rules
// - `primary_key`: primary-key column lookup

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::driver::ConnectionDriver;
use crate::engine::{Engine, Recorders, Reply};
use crate::error::{CodingError, ErrorBox, FanoutError};
use crate::filter::Filter;
use crate::location::Location;
use crate::types::ActionKind;

pub mod batch;
pub mod escape;
pub mod execute;
pub mod primary_key;
pub mod query;

pub use batch::BatchAction;
pub use escape::EscapeStringAction;
pub use execute::ExecuteAction;
pub use primary_key::PrimaryKeyAction;
pub use query::QueryAction;

/// Lifecycle shared by every action.
pub trait DbAction {
    /// Release what the action holds on the Locations it touched, commit them and mark the
    /// action finished. Touching nothing means every Location is committed.
    ///
    /// # Errors
    ///
    /// Driver failures while closing or committing (raise mode).
    fn end_action(&mut self) -> Result<bool, FanoutError>;

    fn is_finished(&self) -> bool;
}

/// State every action keeps: its engine, the facade's error box and the touched Locations.
pub(crate) struct ActionCore<D: ConnectionDriver> {
    engine: Arc<Engine<D>>,
    errors: Arc<ErrorBox>,
    touched: BTreeSet<Location>,
    finished: bool,
}

impl<D: ConnectionDriver> ActionCore<D> {
    pub(crate) fn new(engine: Arc<Engine<D>>, errors: Arc<ErrorBox>) -> Self {
        Self {
            engine,
            errors,
            touched: BTreeSet::new(),
            finished: false,
        }
    }

    pub(crate) fn engine(&self) -> &Engine<D> {
        &self.engine
    }

    pub(crate) fn errors(&self) -> &Arc<ErrorBox> {
        &self.errors
    }

    pub(crate) fn locations(&self) -> &[Location] {
        self.engine.locations()
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finished
    }

    pub(crate) fn has_touched(&self) -> bool {
        !self.touched.is_empty()
    }

    pub(crate) fn mark(&mut self, location: &Location) {
        self.touched.insert(location.clone());
    }

    /// Same filter for every Location.
    pub(crate) fn works_for_all(&self, filter: &Filter) -> BTreeMap<Location, Filter> {
        self.locations()
            .iter()
            .map(|location| (location.clone(), filter.clone()))
            .collect()
    }

    /// Touched Locations in facade order, or all of them when nothing was touched.
    pub(crate) fn end_targets(&self) -> Vec<Location> {
        self.locations()
            .iter()
            .filter(|location| self.touched.is_empty() || self.touched.contains(*location))
            .cloned()
            .collect()
    }

    /// Run `works`: inline for a single Location, fanned out otherwise. Successful
    /// Locations count as touched even when others failed.
    pub(crate) fn round(
        &mut self,
        kind: ActionKind,
        works: BTreeMap<Location, Filter>,
        recorders: Option<&mut Recorders>,
    ) -> Result<BTreeMap<Location, Reply>, FanoutError> {
        if works.is_empty() {
            return Ok(BTreeMap::new());
        }
        let expected = works.len();
        let round = if expected == 1 {
            self.engine.dispatch_sync_many(kind, &works, recorders)?
        } else {
            self.engine.dispatch(kind, works, recorders)?
        };
        self.touched.extend(round.replies().keys().cloned());
        if round.reported() != expected {
            return Err(CodingError::WorkResultMismatch {
                works: expected,
                results: round.reported(),
            }
            .into());
        }
        round.into_result()
    }

    /// One Location, inline.
    pub(crate) fn single(
        &mut self,
        kind: ActionKind,
        filter: &Filter,
        location: &Location,
        recorders: Option<&mut Recorders>,
    ) -> Result<Reply, FanoutError> {
        let reply = self.engine.dispatch_sync(kind, location, filter, recorders)?;
        self.mark(location);
        Ok(reply)
    }

    /// Run `kind` with an empty filter on the end targets without recording them as touched.
    pub(crate) fn on_end_targets(
        &self,
        kind: ActionKind,
    ) -> Result<BTreeMap<Location, Reply>, FanoutError> {
        let works: BTreeMap<Location, Filter> = self
            .end_targets()
            .into_iter()
            .map(|location| (location, Filter::default()))
            .collect();
        let round = match works.len() {
            0 => return Ok(BTreeMap::new()),
            1 => self.engine.dispatch_sync_many(kind, &works, None)?,
            _ => self.engine.dispatch(kind, works, None)?,
        };
        round.into_result()
    }

    /// Commit the end targets and mark the action finished.
    pub(crate) fn commit_and_finish(&mut self) -> Result<(), FanoutError> {
        self.on_end_targets(ActionKind::Commit)?;
        self.finished = true;
        self.touched.clear();
        Ok(())
    }

    pub(crate) fn finish(&mut self) {
        self.finished = true;
        self.touched.clear();
    }
}

/// Affected rows per Location from a round of replies.
pub(crate) fn affected_rows(replies: &BTreeMap<Location, Reply>) -> BTreeMap<Location, u64> {
    replies
        .iter()
        .map(|(location, reply)| (location.clone(), reply.affected()))
        .collect()
}
