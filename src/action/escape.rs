use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use crate::driver::ConnectionDriver;
use crate::engine::{Engine, Reply};
use crate::error::{ErrorBox, FanoutError, Settled};
use crate::filter::Filter;
use crate::location::Location;
use crate::types::ActionKind;

use super::{ActionCore, DbAction};

/// Escapes raw bytes with each connection's own rules. Runs inline on the calling thread.
pub struct EscapeStringAction<D: ConnectionDriver> {
    core: ActionCore<D>,
    escaped: BTreeMap<Location, String>,
    unread: VecDeque<String>,
}

impl<D: ConnectionDriver> EscapeStringAction<D> {
    pub(crate) fn new(engine: Arc<Engine<D>>, errors: Arc<ErrorBox>) -> Self {
        Self {
            core: ActionCore::new(engine, errors),
            escaped: BTreeMap::new(),
            unread: VecDeque::new(),
        }
    }

    /// Escape `raw` on every Location. Replaces whatever the previous call produced.
    ///
    /// # Errors
    ///
    /// The first Location that fails (raise mode).
    pub fn run(&mut self, raw: &[u8]) -> Result<bool, FanoutError> {
        let works = self.core.works_for_all(&Filter::from_bytes(raw));
        let result = self.try_run(&works);
        self.core.errors().settle_flag(result)
    }

    /// Escape `raw` on one Location.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown Location, or the driver failure (raise mode).
    pub fn run_at(&mut self, raw: &[u8], location: &Location) -> Result<bool, FanoutError> {
        let works = BTreeMap::from([(location.clone(), Filter::from_bytes(raw))]);
        let result = self.try_run(&works);
        self.core.errors().settle_flag(result)
    }

    /// Next escaped string in Location order, `None` once all were handed out.
    pub fn escaped_string(&mut self) -> Option<String> {
        self.unread.pop_front()
    }

    /// # Errors
    ///
    /// `NotFound` when nothing was escaped for `location` (raise mode).
    pub fn escaped_string_at(&self, location: &Location) -> Settled<String> {
        let result = self
            .escaped
            .get(location)
            .cloned()
            .ok_or_else(|| FanoutError::not_found("escaped string", location.to_string()));
        self.core.errors().settle(result)
    }

    fn try_run(&mut self, works: &BTreeMap<Location, Filter>) -> Result<(), FanoutError> {
        self.escaped.clear();
        self.unread.clear();
        let round = self
            .core
            .engine()
            .dispatch_sync_many(ActionKind::Escape, works, None)?;
        for (location, reply) in round.into_result()? {
            if let Reply::Escaped(text) = reply {
                self.escaped.insert(location, text);
            }
        }
        self.unread = self.escaped.values().cloned().collect();
        Ok(())
    }
}

impl<D: ConnectionDriver> DbAction for EscapeStringAction<D> {
    /// Nothing to release or commit.
    fn end_action(&mut self) -> Result<bool, FanoutError> {
        self.core.finish();
        Ok(true)
    }

    fn is_finished(&self) -> bool {
        self.core.is_finished()
    }
}
