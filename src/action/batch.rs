use std::collections::BTreeMap;
use std::sync::Arc;

use crate::driver::ConnectionDriver;
use crate::engine::Engine;
use crate::error::{ErrorBox, FanoutError};
use crate::filter::{BatchFilter, Filter};
use crate::location::Location;
use crate::results::ExecuteResult;
use crate::statement::{BatchMode, PrimaryKeySource, StatementGenerator, batch_generator};
use crate::types::ActionKind;

use super::{DbAction, ExecuteAction};

/// Buffers submitted rows per Location and flushes them as one multi-value statement
/// every `values_per_batch` rows, or earlier when a row does not fit the buffered table
/// and column list.
pub struct BatchAction<D: ConnectionDriver> {
    execute: ExecuteAction<D>,
    mode: BatchMode,
    values_per_batch: usize,
    generators: BTreeMap<Location, Box<dyn StatementGenerator>>,
    counts: BTreeMap<Location, usize>,
    keys: Box<dyn PrimaryKeySource>,
}

impl<D: ConnectionDriver> BatchAction<D> {
    pub(crate) fn new(
        engine: Arc<Engine<D>>,
        errors: Arc<ErrorBox>,
        mode: BatchMode,
        commit_limit: u64,
        values_per_batch: usize,
        keys: Box<dyn PrimaryKeySource>,
    ) -> Self {
        let dialect = engine.dialect();
        let generators = engine
            .locations()
            .iter()
            .map(|location| (location.clone(), batch_generator(dialect, mode)))
            .collect();
        let counts = engine
            .locations()
            .iter()
            .map(|location| (location.clone(), 0))
            .collect();
        Self {
            execute: ExecuteAction::new(engine, errors, ActionKind::Insert, commit_limit),
            mode,
            values_per_batch: values_per_batch.max(1),
            generators,
            counts,
            keys,
        }
    }

    #[must_use]
    pub fn mode(&self) -> BatchMode {
        self.mode
    }

    #[must_use]
    pub fn values_per_batch(&self) -> usize {
        self.values_per_batch
    }

    /// Rows currently buffered for `location`.
    #[must_use]
    pub fn buffered(&self, location: &Location) -> usize {
        self.counts.get(location).copied().unwrap_or_default()
    }

    /// Submit the same row to every Location.
    ///
    /// # Errors
    ///
    /// Failures of a flush triggered by this row (raise mode).
    pub fn run(&mut self, filter: &BatchFilter) -> Result<bool, FanoutError> {
        let works = self
            .execute
            .core()
            .locations()
            .iter()
            .map(|location| (location.clone(), filter.clone()))
            .collect();
        self.run_many(works)
    }

    /// Submit a row to one Location; flushes go through the calling thread.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown Location, or failures of a triggered flush (raise mode).
    pub fn run_at(&mut self, filter: &BatchFilter, location: &Location) -> Result<bool, FanoutError> {
        let result = self.try_run_at(filter, location);
        self.execute.core().errors().settle_flag(result)
    }

    /// Submit a different row per Location. Some Locations may flush while others only
    /// buffer.
    ///
    /// # Errors
    ///
    /// See [`BatchAction::run`].
    pub fn run_many(&mut self, works: BTreeMap<Location, BatchFilter>) -> Result<bool, FanoutError> {
        let result = self.try_run_many(&works);
        self.execute.core().errors().settle_flag(result)
    }

    /// Cumulative affected rows of the flushed statements.
    #[must_use]
    pub fn get_result(&self) -> ExecuteResult {
        self.execute.get_result()
    }

    fn makeup(generator: &mut dyn StatementGenerator, filter: &BatchFilter) -> bool {
        generator.makeup_statement(
            filter.columns(),
            filter.table(),
            filter.values(),
            filter.force_check(),
        )
    }

    /// Form the buffered statement and clear the generator, which drops the rows even
    /// when forming fails.
    fn drain(&mut self, location: &Location) -> Result<Option<String>, FanoutError> {
        let generator = self
            .generators
            .get_mut(location)
            .ok_or_else(|| FanoutError::not_found("location", location.to_string()))?;
        let statement = generator.form_statement(location, self.keys.as_ref());
        generator.clear_content();
        let statement = statement?;
        Ok((!statement.is_empty()).then_some(statement))
    }

    fn try_run_at(&mut self, filter: &BatchFilter, location: &Location) -> Result<(), FanoutError> {
        let limit = self.values_per_batch;
        let generator = self
            .generators
            .get_mut(location)
            .ok_or_else(|| FanoutError::not_found("location", location.to_string()))?;
        let incompatible = Self::makeup(generator.as_mut(), filter);
        let count = self.counts.entry(location.clone()).or_default();
        if incompatible {
            *count = limit;
        } else {
            *count += 1;
        }

        let mut flushed = Ok(());
        if *count >= limit {
            *count = 0;
            flushed = match self.drain(location) {
                Ok(Some(statement)) => self
                    .execute
                    .try_run_at(&Filter::new(statement), location)
                    .map(|_| ()),
                Ok(None) => Ok(()),
                Err(err) => Err(err),
            };
        }

        if incompatible && let Some(generator) = self.generators.get_mut(location) {
            Self::makeup(generator.as_mut(), filter);
            *self.counts.entry(location.clone()).or_default() += 1;
        }
        flushed
    }

    fn try_run_many(&mut self, works: &BTreeMap<Location, BatchFilter>) -> Result<(), FanoutError> {
        if let Some(unknown) = works.keys().find(|loc| !self.generators.contains_key(*loc)) {
            return Err(FanoutError::not_found("location", unknown.to_string()));
        }
        let limit = self.values_per_batch;

        let mut remains = Vec::new();
        for (location, filter) in works {
            let incompatible = self
                .generators
                .get_mut(location)
                .is_some_and(|generator| Self::makeup(generator.as_mut(), filter));
            let count = self.counts.entry(location.clone()).or_default();
            if incompatible {
                *count = limit;
                remains.push(location.clone());
            } else {
                *count += 1;
            }
        }

        let due: Vec<Location> = self
            .counts
            .iter_mut()
            .filter(|(_, count)| **count >= limit)
            .map(|(location, count)| {
                *count = 0;
                location.clone()
            })
            .collect();

        let mut flushes = BTreeMap::new();
        let mut failure = None;
        for location in due {
            match self.drain(&location) {
                Ok(Some(statement)) => {
                    flushes.insert(location, Filter::new(statement));
                }
                Ok(None) => {}
                Err(err) => {
                    failure.get_or_insert(err);
                }
            }
        }
        if !flushes.is_empty() {
            tracing::debug!(locations = flushes.len(), "flushing batch");
            if let Err(err) = self.execute.try_run_many(flushes) {
                failure.get_or_insert(err);
            }
        }

        // rows that forced a flush are buffered again even when the flush failed
        for location in remains {
            if let (Some(generator), Some(filter)) =
                (self.generators.get_mut(&location), works.get(&location))
            {
                Self::makeup(generator.as_mut(), filter);
                *self.counts.entry(location).or_default() += 1;
            }
        }

        failure.map_or(Ok(()), Err)
    }

    fn try_end(&mut self) -> Result<(), FanoutError> {
        let limit = self.values_per_batch;
        for count in self.counts.values_mut() {
            *count = limit;
        }
        let flush_all = self
            .generators
            .keys()
            .map(|location| (location.clone(), BatchFilter::default()))
            .collect();
        self.try_run_many(&flush_all)?;
        self.execute.try_end()
    }
}

impl<D: ConnectionDriver> DbAction for BatchAction<D> {
    fn end_action(&mut self) -> Result<bool, FanoutError> {
        let result = self.try_end();
        self.execute.core().errors().settle_flag(result)
    }

    fn is_finished(&self) -> bool {
        self.execute.is_finished()
    }
}
