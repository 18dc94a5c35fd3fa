use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use crate::action::DbAction;
use crate::config::TasksOptions;
use crate::driver::ConnectionDriver;
use crate::error::{FanoutError, PropagationMode, Settled};
use crate::location::Location;
use crate::tasks::DbTasks;

type KeyCache = HashMap<(Location, String), Arc<Vec<String>>>;

// Shared by every facade in the process; primary keys are assumed not to change.
static PRIMARY_KEYS: LazyLock<Mutex<KeyCache>> = LazyLock::new(|| Mutex::new(HashMap::new()));

/// Where generators get the primary-key columns of a table from.
pub trait PrimaryKeySource: Send + Sync {
    /// # Errors
    ///
    /// Lookup failures, or `NotFound` when the table has no primary key.
    fn primary_keys(&self, location: &Location, table: &str)
    -> Result<Arc<Vec<String>>, FanoutError>;
}

/// Process-wide cache keyed by Location and table. A miss runs the dialect's lookup
/// query over a dedicated short-lived connection.
#[derive(Debug)]
pub struct CachedPrimaryKeys<D: ConnectionDriver> {
    driver: Arc<D>,
}

impl<D: ConnectionDriver> CachedPrimaryKeys<D> {
    #[must_use]
    pub fn new(driver: Arc<D>) -> Self {
        Self { driver }
    }

    /// Cached keys, without triggering a lookup.
    #[must_use]
    pub fn cached(location: &Location, table: &str) -> Option<Arc<Vec<String>>> {
        PRIMARY_KEYS
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(location.clone(), table.to_string()))
            .cloned()
    }

    fn lookup(&self, location: &Location, table: &str) -> Result<Vec<String>, FanoutError> {
        tracing::debug!(%location, table, "looking up primary keys");
        let options = TasksOptions::new(vec![location.clone()]).with_queue_capacity(1);
        let mut tasks = DbTasks::new(Arc::clone(&self.driver), options);
        tasks.set_propagation_mode(PropagationMode::Raise);
        tasks.connect()?;

        let looked_up = (|| -> Result<Vec<String>, FanoutError> {
            let action = raised(tasks.primary_keys())?;
            action.lookup_at(table, location)?;
            let mut keys = raised(action.keys())?;
            action.end_action()?;
            Ok(keys.remove(location).unwrap_or_default())
        })();
        let disconnected = tasks.disconnect();
        let keys = looked_up?;
        disconnected?;
        Ok(keys)
    }
}

impl<D: ConnectionDriver> PrimaryKeySource for CachedPrimaryKeys<D> {
    fn primary_keys(
        &self,
        location: &Location,
        table: &str,
    ) -> Result<Arc<Vec<String>>, FanoutError> {
        if let Some(keys) = Self::cached(location, table) {
            return Ok(keys);
        }
        // lock is not held during the lookup; a concurrent miss may query twice
        let keys = self.lookup(location, table)?;
        if keys.is_empty() {
            return Err(FanoutError::not_found("primary key", table));
        }
        let mut cache = PRIMARY_KEYS.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(
            cache
                .entry((location.clone(), table.to_string()))
                .or_insert_with(|| Arc::new(keys)),
        ))
    }
}

/// The lookup facade raises, so a settled `None` only means a failure went missing.
fn raised<T>(settled: Settled<T>) -> Result<T, FanoutError> {
    settled?.ok_or_else(|| FanoutError::sequence("lookup failure was accumulated instead of raised"))
}
