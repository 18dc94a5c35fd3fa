use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{ErrorBox, FanoutError, Settled};
use crate::location::Location;

/// Cumulative affected-row counts of an execute-family action, keyed by Location.
#[derive(Debug, Clone)]
pub struct ExecuteResult {
    affected: BTreeMap<Location, u64>,
    errors: Arc<ErrorBox>,
}

impl ExecuteResult {
    pub(crate) fn new(affected: BTreeMap<Location, u64>, errors: Arc<ErrorBox>) -> Self {
        Self { affected, errors }
    }

    #[must_use]
    pub fn affected_rows(&self) -> &BTreeMap<Location, u64> {
        &self.affected
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.affected.values().sum()
    }

    /// Affected rows on one Location.
    ///
    /// # Errors
    ///
    /// `FanoutError::NotFound` when the Location is not part of the result (raise mode).
    pub fn affected_rows_at(&self, location: &Location) -> Settled<u64> {
        self.errors.settle(self.lookup(location))
    }

    /// Affected rows on several Locations.
    ///
    /// # Errors
    ///
    /// `FanoutError::NotFound` naming the first Location absent from the result (raise mode).
    pub fn affected_rows_for(&self, locations: &[Location]) -> Settled<BTreeMap<Location, u64>> {
        let collected = locations
            .iter()
            .map(|location| Ok((location.clone(), self.lookup(location)?)))
            .collect::<Result<BTreeMap<_, _>, FanoutError>>();
        self.errors.settle(collected)
    }

    fn lookup(&self, location: &Location) -> Result<u64, FanoutError> {
        self.affected
            .get(location)
            .copied()
            .ok_or_else(|| FanoutError::not_found("location", location.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, PropagationMode};

    fn sample(mode: PropagationMode) -> (ExecuteResult, Location, Location) {
        let a = Location::sqlite("a.db");
        let b = Location::sqlite("b.db");
        let affected = BTreeMap::from([(a.clone(), 3), (b.clone(), 4)]);
        (
            ExecuteResult::new(affected, Arc::new(ErrorBox::new(mode))),
            a,
            b,
        )
    }

    #[test]
    fn lookups_by_location() -> Result<(), FanoutError> {
        let (result, a, b) = sample(PropagationMode::Raise);
        assert_eq!(result.total(), 7);
        assert_eq!(result.affected_rows_at(&a)?, Some(3));
        let both = result.affected_rows_for(&[a, b.clone()])?.unwrap_or_default();
        assert_eq!(both.get(&b), Some(&4));
        let err = result
            .affected_rows_at(&Location::sqlite("c.db"))
            .expect_err("unknown location");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        Ok(())
    }

    #[test]
    fn accumulate_mode_reports_none() -> Result<(), FanoutError> {
        let (result, ..) = sample(PropagationMode::Accumulate);
        assert_eq!(result.affected_rows_at(&Location::sqlite("c.db"))?, None);
        Ok(())
    }
}
