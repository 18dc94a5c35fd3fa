use std::collections::BTreeMap;
use std::sync::Arc;

use crate::action::QueryAction;
use crate::driver::ConnectionDriver;
use crate::engine::Reply;
use crate::error::{FanoutError, Settled};
use crate::filter::Filter;
use crate::location::Location;
use crate::types::ActionKind;

use super::row::{ColumnIndex, Row};

/// Reader over the result sets a [`QueryAction`] opened.
///
/// [`QueryResult::fetch`] walks the Locations in facade order and moves to the next one
/// when the current one is exhausted. Rows are copies, so they stay valid after later
/// fetches.
pub struct QueryResult<'a, D: ConnectionDriver> {
    action: &'a QueryAction<D>,
    targets: Vec<Location>,
    cursor: usize,
}

impl<'a, D: ConnectionDriver> QueryResult<'a, D> {
    pub(crate) fn new(action: &'a QueryAction<D>) -> Self {
        Self {
            targets: action.open_locations(),
            action,
            cursor: 0,
        }
    }

    /// Location the next [`QueryResult::fetch`] reads from, `None` once all are exhausted.
    #[must_use]
    pub fn current_location(&self) -> Option<&Location> {
        self.targets.get(self.cursor)
    }

    /// Next row across all Locations. An empty [`Row`] means every Location is exhausted.
    ///
    /// # Errors
    ///
    /// The first fetch failure; iteration stops there (raise mode).
    pub fn fetch(&mut self) -> Settled<Row> {
        let result = self.try_fetch();
        self.action.errors().settle(result)
    }

    /// Next row of one Location, without moving to other Locations.
    ///
    /// # Errors
    ///
    /// `NotFound` when no result set is open on `location`, or the fetch failure (raise mode).
    pub fn fetch_at(&mut self, location: &Location) -> Settled<Row> {
        let result = self.try_fetch_at(location);
        self.action.errors().settle(result)
    }

    /// Next row of several Locations at once. Exhausted Locations map to an empty [`Row`]
    /// when `include_empty` is set and are left out otherwise.
    ///
    /// # Errors
    ///
    /// `NotFound` for a Location without an open result set, or fetch failures (raise mode).
    pub fn fetch_many(
        &mut self,
        locations: &[Location],
        include_empty: bool,
    ) -> Settled<BTreeMap<Location, Row>> {
        let result = self.try_fetch_many(locations, include_empty);
        self.action.errors().settle(result)
    }

    /// Byte length of every column of the row last fetched from the current Location.
    ///
    /// # Errors
    ///
    /// `CodeSequence` once every Location is exhausted, or the driver failure (raise mode).
    pub fn column_lengths(&self) -> Settled<Vec<usize>> {
        let result = self
            .current_location()
            .ok_or_else(|| FanoutError::sequence("no current location to read column lengths from"))
            .and_then(|location| self.lengths_at(location));
        self.action.errors().settle(result)
    }

    /// # Errors
    ///
    /// `NotFound` when no result set is open on `location`, or the driver failure (raise mode).
    pub fn column_lengths_at(&self, location: &Location) -> Settled<Vec<usize>> {
        let result = self.lengths_at(location);
        self.action.errors().settle(result)
    }

    /// # Errors
    ///
    /// The first Location that fails (raise mode).
    pub fn column_lengths_many(
        &self,
        locations: &[Location],
    ) -> Settled<BTreeMap<Location, Vec<usize>>> {
        let result = locations
            .iter()
            .map(|location| Ok((location.clone(), self.lengths_at(location)?)))
            .collect::<Result<BTreeMap<_, _>, FanoutError>>();
        self.action.errors().settle(result)
    }

    fn columns(&self, location: &Location) -> Result<&'a Arc<ColumnIndex>, FanoutError> {
        self.action
            .columns_at(location)
            .ok_or_else(|| FanoutError::not_found("open result", location.to_string()))
    }

    fn try_fetch(&mut self) -> Result<Row, FanoutError> {
        while let Some(location) = self.targets.get(self.cursor) {
            let reply = self.action.engine().dispatch_sync(
                ActionKind::Fetch,
                location,
                &Filter::default(),
                None,
            )?;
            match to_row(location, self.columns(location)?, reply)? {
                Some(row) => return Ok(row),
                None => self.cursor += 1,
            }
        }
        Ok(Row::end())
    }

    pub(crate) fn try_fetch_at(&mut self, location: &Location) -> Result<Row, FanoutError> {
        let columns = self.columns(location)?;
        let reply = self.action.engine().dispatch_sync(
            ActionKind::Fetch,
            location,
            &Filter::default(),
            None,
        )?;
        Ok(to_row(location, columns, reply)?.unwrap_or_else(Row::end))
    }

    fn try_fetch_many(
        &mut self,
        locations: &[Location],
        include_empty: bool,
    ) -> Result<BTreeMap<Location, Row>, FanoutError> {
        let mut works = BTreeMap::new();
        for location in locations {
            self.columns(location)?;
            works.insert(location.clone(), Filter::default());
        }
        let engine = self.action.engine();
        let round = if works.len() == 1 {
            engine.dispatch_sync_many(ActionKind::Fetch, &works, None)?
        } else {
            engine.dispatch(ActionKind::Fetch, works, None)?
        };

        let mut rows = BTreeMap::new();
        for (location, reply) in round.into_result()? {
            match to_row(&location, self.columns(&location)?, reply)? {
                Some(row) => {
                    rows.insert(location, row);
                }
                None if include_empty => {
                    rows.insert(location, Row::end());
                }
                None => {}
            }
        }
        Ok(rows)
    }

    fn lengths_at(&self, location: &Location) -> Result<Vec<usize>, FanoutError> {
        self.columns(location)?;
        match self.action.engine().dispatch_sync(
            ActionKind::ColumnLengths,
            location,
            &Filter::default(),
            None,
        )? {
            Reply::Lengths(lengths) => Ok(lengths),
            other => Err(unexpected(location, &other)),
        }
    }
}

fn to_row(
    location: &Location,
    columns: &Arc<ColumnIndex>,
    reply: Reply,
) -> Result<Option<Row>, FanoutError> {
    match reply {
        Reply::Row(Some(cells)) => Ok(Some(Row::new(Arc::clone(columns), cells))),
        Reply::Row(None) => Ok(None),
        other => Err(unexpected(location, &other)),
    }
}

fn unexpected(location: &Location, reply: &Reply) -> FanoutError {
    FanoutError::sequence(format!("unexpected reply from {location}: {reply:?}"))
}
