use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Deserialize;

use crate::driver::ConnectionDriver;
use crate::error::{FanoutError, PropagationMode};
use crate::location::Location;
use crate::tasks::DbTasks;

const DEFAULT_QUEUE_CAPACITY: usize = 64;
const DEFAULT_COMMIT_LIMIT: u64 = 5000;
const DEFAULT_VALUES_PER_BATCH: usize = 10;

/// Options for a [`DbTasks`] facade.
///
/// ```rust
/// use sql_fanout::prelude::*;
///
/// let options = TasksOptions::from_json(
///     r#"{ "locations": [ { "ip": "", "port": 0, "db_id": ":memory:", "user": "" } ],
///          "propagation": "accumulate" }"#,
/// )?;
/// assert_eq!(options.propagation, PropagationMode::Accumulate);
/// assert_eq!(options.queue_capacity, 64);
/// # Ok::<(), FanoutError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TasksOptions {
    pub locations: Vec<Location>,
    pub propagation: PropagationMode,
    /// Bound of every worker's command queue.
    pub queue_capacity: usize,
    pub default_commit_limit: u64,
    pub default_values_per_batch: usize,
}

impl Default for TasksOptions {
    fn default() -> Self {
        Self {
            locations: Vec::new(),
            propagation: PropagationMode::Raise,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            default_commit_limit: DEFAULT_COMMIT_LIMIT,
            default_values_per_batch: DEFAULT_VALUES_PER_BATCH,
        }
    }
}

impl TasksOptions {
    #[must_use]
    pub fn new(locations: Vec<Location>) -> Self {
        Self {
            locations,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_propagation(mut self, propagation: PropagationMode) -> Self {
        self.propagation = propagation;
        self
    }

    #[must_use]
    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    /// Parse and validate options from JSON. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// `Json` for malformed input, `ConfigError` when validation fails.
    pub fn from_json(text: &str) -> Result<Self, FanoutError> {
        let options: Self = serde_json::from_str(text)?;
        options.validate()?;
        Ok(options)
    }

    /// # Errors
    ///
    /// `ConfigError` for an empty or duplicated Location list, or zero-sized limits.
    pub fn validate(&self) -> Result<(), FanoutError> {
        if self.locations.is_empty() {
            return Err(FanoutError::ConfigError("no locations configured".into()));
        }
        let mut seen = BTreeSet::new();
        if let Some(duplicate) = self.locations.iter().find(|location| !seen.insert(*location)) {
            return Err(FanoutError::ConfigError(format!(
                "location listed twice: {duplicate}"
            )));
        }
        if self.queue_capacity == 0 {
            return Err(FanoutError::ConfigError("queue_capacity must be positive".into()));
        }
        if self.default_values_per_batch == 0 {
            return Err(FanoutError::ConfigError(
                "default_values_per_batch must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Fluent builder for [`TasksOptions`].
#[derive(Debug, Clone, Default)]
pub struct TasksOptionsBuilder {
    opts: TasksOptions,
}

impl TasksOptionsBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn location(mut self, location: Location) -> Self {
        self.opts.locations.push(location);
        self
    }

    #[must_use]
    pub fn locations(mut self, locations: impl IntoIterator<Item = Location>) -> Self {
        self.opts.locations.extend(locations);
        self
    }

    #[must_use]
    pub fn propagation(mut self, propagation: PropagationMode) -> Self {
        self.opts.propagation = propagation;
        self
    }

    #[must_use]
    pub fn queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.opts.queue_capacity = queue_capacity;
        self
    }

    #[must_use]
    pub fn default_commit_limit(mut self, limit: u64) -> Self {
        self.opts.default_commit_limit = limit;
        self
    }

    #[must_use]
    pub fn default_values_per_batch(mut self, values: usize) -> Self {
        self.opts.default_values_per_batch = values;
        self
    }

    #[must_use]
    pub fn finish(self) -> TasksOptions {
        self.opts
    }

    /// Validate the options and create an unconnected facade.
    ///
    /// # Errors
    ///
    /// `ConfigError` when validation fails.
    pub fn build<D: ConnectionDriver>(self, driver: D) -> Result<DbTasks<D>, FanoutError> {
        let options = self.finish();
        options.validate()?;
        Ok(DbTasks::new(Arc::new(driver), options))
    }
}
