// Worker-per-Location execution engine.
//
// - `channel`: commands, work items, completions and replies
// - `commit`: commit threshold bookkeeping
// - `dispatcher`: the worker loop and the primitive execution shared with sync dispatch
// - `manager`: worker thread lifecycle

use std::collections::BTreeMap;
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, PoisonError};

use crate::driver::ConnectionDriver;
use crate::error::{DriverFailure, FanoutError};
use crate::filter::Filter;
use crate::location::Location;
use crate::types::{ActionKind, Dialect};

mod channel;
pub mod commit;
mod dispatcher;
mod manager;

pub use channel::Reply;
pub use commit::{AffectedRowRecorder, CommitJudge};

use channel::{Completion, WorkItem};
use dispatcher::{lock_handle, perform};
use manager::Worker;

/// Per-Location affected-row recorders of an execute-family action.
pub type Recorders = BTreeMap<Location, AffectedRowRecorder>;

/// Everything collected from one dispatch round, keyed by Location.
#[derive(Debug, Default)]
pub struct Round {
    replies: BTreeMap<Location, Reply>,
    failures: Vec<DriverFailure>,
}

impl Round {
    #[must_use]
    pub fn replies(&self) -> &BTreeMap<Location, Reply> {
        &self.replies
    }

    #[must_use]
    pub fn failures(&self) -> &[DriverFailure] {
        &self.failures
    }

    /// Number of Locations that reported back, successfully or not.
    #[must_use]
    pub fn reported(&self) -> usize {
        self.replies.len() + self.failures.len()
    }

    /// Successful replies, or every failure together with the Locations that succeeded.
    ///
    /// # Errors
    ///
    /// `FanoutError::Locations` when at least one Location failed.
    pub fn into_result(self) -> Result<BTreeMap<Location, Reply>, FanoutError> {
        if self.failures.is_empty() {
            Ok(self.replies)
        } else {
            Err(FanoutError::Locations {
                failures: self.failures,
                succeeded: self.replies.into_keys().collect(),
            })
        }
    }

    fn absorb(&mut self, location: Location, outcome: Result<Reply, DriverFailure>) {
        match outcome {
            Ok(reply) => {
                self.replies.insert(location, reply);
            }
            Err(failure) => self.failures.push(failure),
        }
    }
}

/// Owns one worker and one driver handle per Location.
pub struct Engine<D: ConnectionDriver> {
    driver: Arc<D>,
    locations: Vec<Location>,
    handles: BTreeMap<Location, Arc<Mutex<D::Handle>>>,
    workers: Mutex<BTreeMap<Location, Worker>>,
    completions: Mutex<Receiver<Completion>>,
}

impl<D: ConnectionDriver> Engine<D> {
    /// Start exactly one worker per Location.
    ///
    /// # Errors
    ///
    /// `ConfigError` for duplicated Locations, `ConnectionError` when a thread cannot be spawned.
    pub fn start(
        driver: Arc<D>,
        locations: Vec<Location>,
        queue_capacity: usize,
    ) -> Result<Self, FanoutError> {
        let (completion_tx, completion_rx) = mpsc::channel();
        let mut handles = BTreeMap::new();
        let mut workers = BTreeMap::new();

        for (id, location) in locations.iter().enumerate() {
            if handles.contains_key(location) {
                return Err(FanoutError::ConfigError(format!(
                    "location listed twice: {location}"
                )));
            }
            let handle = Arc::new(Mutex::new(driver.new_handle(location)));
            let worker = Worker::spawn(
                id,
                Arc::clone(&driver),
                location.clone(),
                Arc::clone(&handle),
                queue_capacity.max(1),
                completion_tx.clone(),
            )?;
            handles.insert(location.clone(), handle);
            workers.insert(location.clone(), worker);
        }
        tracing::debug!(workers = workers.len(), "engine started");

        Ok(Self {
            driver,
            locations,
            handles,
            workers: Mutex::new(workers),
            completions: Mutex::new(completion_rx),
        })
    }

    #[must_use]
    pub fn driver(&self) -> &Arc<D> {
        &self.driver
    }

    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.driver.dialect()
    }

    /// Locations in the order they were configured.
    #[must_use]
    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    /// Broadcast one filter to every Location and wait for all of them.
    ///
    /// # Errors
    ///
    /// See [`Engine::dispatch`].
    pub fn dispatch_all(
        &self,
        kind: ActionKind,
        filter: &Filter,
        recorders: Option<&mut Recorders>,
    ) -> Result<Round, FanoutError> {
        let works = self
            .locations
            .iter()
            .map(|location| (location.clone(), filter.clone()))
            .collect();
        self.dispatch(kind, works, recorders)
    }

    /// Queue one work item per targeted Location, then block until each of them reported.
    ///
    /// Driver failures do not fail the round; they are collected in the returned [`Round`].
    ///
    /// # Errors
    ///
    /// `NotFound` when a target is not one of the engine's Locations, `ConnectionError` when
    /// the completion channel is gone.
    pub fn dispatch(
        &self,
        kind: ActionKind,
        works: BTreeMap<Location, Filter>,
        mut recorders: Option<&mut Recorders>,
    ) -> Result<Round, FanoutError> {
        if let Some(unknown) = works.keys().find(|loc| !self.handles.contains_key(*loc)) {
            return Err(FanoutError::not_found("location", unknown.to_string()));
        }
        tracing::debug!(?kind, targets = works.len(), "dispatching round");

        // holding the receiver serializes rounds
        let completions = self
            .completions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut round = Round::default();
        let mut pending = 0usize;
        {
            let workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
            for (location, filter) in works {
                let recorder = recorders.as_mut().and_then(|map| map.remove(&location));
                let item = WorkItem {
                    location: location.clone(),
                    kind,
                    filter,
                    recorder,
                };
                let pushed = match workers.get(&location) {
                    Some(worker) => worker.push(item),
                    None => Err(Some(item)),
                };
                match pushed {
                    Ok(()) => pending += 1,
                    Err(rejected) => {
                        if let (Some(item), Some(map)) = (rejected, recorders.as_mut())
                            && let Some(recorder) = item.recorder
                        {
                            map.insert(location.clone(), recorder);
                        }
                        round.failures.push(DriverFailure {
                            kind: kind.failure_kind(),
                            location,
                            message: "worker is not running".into(),
                            code: -1,
                            statement: None,
                        });
                    }
                }
            }
        }

        for _ in 0..pending {
            let completion = completions.recv().map_err(|_| {
                FanoutError::ConnectionError("all workers stopped during a dispatch".into())
            })?;
            if let (Some(map), Some(recorder)) = (recorders.as_mut(), completion.recorder) {
                map.insert(completion.location.clone(), recorder);
            }
            round.absorb(completion.location, completion.outcome);
        }
        Ok(round)
    }

    /// Run one primitive inline on the calling thread against `location`'s handle.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown Location, `Locations` carrying the driver failure.
    pub fn dispatch_sync(
        &self,
        kind: ActionKind,
        location: &Location,
        filter: &Filter,
        recorders: Option<&mut Recorders>,
    ) -> Result<Reply, FanoutError> {
        let handle = self
            .handles
            .get(location)
            .ok_or_else(|| FanoutError::not_found("location", location.to_string()))?;
        let recorder = recorders.and_then(|map| map.get_mut(location));
        let mut guard = lock_handle(handle, location);
        perform(&*self.driver, &mut guard, location, kind, filter, recorder)
            .map_err(FanoutError::from)
    }

    /// Inline variant of [`Engine::dispatch`]; stops at the first failure.
    ///
    /// # Errors
    ///
    /// See [`Engine::dispatch_sync`].
    pub fn dispatch_sync_many(
        &self,
        kind: ActionKind,
        works: &BTreeMap<Location, Filter>,
        mut recorders: Option<&mut Recorders>,
    ) -> Result<Round, FanoutError> {
        let mut round = Round::default();
        for (location, filter) in works {
            let reply = self.dispatch_sync(kind, location, filter, recorders.as_deref_mut())?;
            round.replies.insert(location.clone(), reply);
        }
        Ok(round)
    }

    /// Push the end-of-work signal to every worker and join them. Idempotent.
    pub fn shutdown(&self) {
        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        if workers.is_empty() {
            return;
        }
        for worker in workers.values_mut() {
            worker.stop();
        }
        workers.clear();
        tracing::debug!("engine stopped");
    }
}

impl<D: ConnectionDriver> Drop for Engine<D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
