use std::sync::Arc;

use crate::action::{
    BatchAction, DbAction, EscapeStringAction, ExecuteAction, PrimaryKeyAction, QueryAction,
};
use crate::config::TasksOptions;
use crate::driver::ConnectionDriver;
use crate::engine::Engine;
use crate::error::{CodingError, ErrorBox, FanoutError, PropagationMode, Settled};
use crate::filter::Filter;
use crate::location::Location;
use crate::statement::{BatchMode, CachedPrimaryKeys};
use crate::types::{ActionKind, Dialect};

/// The action currently owned by a facade.
enum CurrentAction<D: ConnectionDriver> {
    Query(QueryAction<D>),
    Execute(ExecuteAction<D>),
    Batch(BatchAction<D>),
    Escape(EscapeStringAction<D>),
    PrimaryKeys(PrimaryKeyAction<D>),
}

impl<D: ConnectionDriver> CurrentAction<D> {
    fn as_action(&mut self) -> &mut dyn DbAction {
        match self {
            Self::Query(action) => action,
            Self::Execute(action) => action,
            Self::Batch(action) => action,
            Self::Escape(action) => action,
            Self::PrimaryKeys(action) => action,
        }
    }

    fn is_finished(&self) -> bool {
        match self {
            Self::Query(action) => action.is_finished(),
            Self::Execute(action) => action.is_finished(),
            Self::Batch(action) => action.is_finished(),
            Self::Escape(action) => action.is_finished(),
            Self::PrimaryKeys(action) => action.is_finished(),
        }
    }
}

/// Action types a facade can hold as its current action.
trait Installable<D: ConnectionDriver>: DbAction + Sized {
    fn wrap(self) -> CurrentAction<D>;

    fn unwrap_mut(current: &mut CurrentAction<D>) -> Option<&mut Self>;
}

macro_rules! installable {
    ($action:ident, $variant:ident) => {
        impl<D: ConnectionDriver> Installable<D> for $action<D> {
            fn wrap(self) -> CurrentAction<D> {
                CurrentAction::$variant(self)
            }

            fn unwrap_mut(current: &mut CurrentAction<D>) -> Option<&mut Self> {
                match current {
                    CurrentAction::$variant(action) => Some(action),
                    _ => None,
                }
            }
        }
    };
}

installable!(QueryAction, Query);
installable!(ExecuteAction, Execute);
installable!(BatchAction, Batch);
installable!(EscapeStringAction, Escape);
installable!(PrimaryKeyAction, PrimaryKeys);

/// Entry point for one fixed set of Locations behind one driver.
///
/// Owns the engine while connected and at most one unfinished action. Every factory
/// fails with [`CodingError::PrevWorkNotFinished`] until the current action's
/// `end_action` succeeded.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use sql_fanout::prelude::*;
///
/// # fn main() -> Result<(), FanoutError> {
/// let options = TasksOptions::new(vec![Location::sqlite("a.db"), Location::sqlite("b.db")]);
/// let mut tasks = DbTasks::new(Arc::new(SqliteDriver::new()), options);
/// tasks.connect()?;
///
/// if let Some(batch) = tasks.batch_insert(5000, 100)? {
///     for id in 0..1000 {
///         let mut row = BatchFilter::new("t");
///         row.append("id", id).append("name", "x");
///         batch.run(&row)?;
///     }
///     batch.end_action()?;
/// }
///
/// tasks.disconnect()?;
/// # Ok(())
/// # }
/// ```
pub struct DbTasks<D: ConnectionDriver> {
    driver: Arc<D>,
    options: TasksOptions,
    errors: Arc<ErrorBox>,
    engine: Option<Arc<Engine<D>>>,
    current: Option<CurrentAction<D>>,
}

impl<D: ConnectionDriver> DbTasks<D> {
    #[must_use]
    pub fn new(driver: Arc<D>, options: TasksOptions) -> Self {
        Self {
            errors: Arc::new(ErrorBox::new(options.propagation)),
            driver,
            options,
            engine: None,
            current: None,
        }
    }

    #[must_use]
    pub fn driver(&self) -> &Arc<D> {
        &self.driver
    }

    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.driver.dialect()
    }

    #[must_use]
    pub fn locations(&self) -> &[Location] {
        &self.options.locations
    }

    #[must_use]
    pub fn options(&self) -> &TasksOptions {
        &self.options
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.engine.is_some()
    }

    #[must_use]
    pub fn propagation_mode(&self) -> PropagationMode {
        self.errors.mode()
    }

    pub fn set_propagation_mode(&mut self, mode: PropagationMode) {
        self.errors.set_mode(mode);
    }

    /// Most recent failure stored in accumulate mode. Kept until taken.
    #[must_use]
    pub fn last_error(&self) -> Option<Arc<FanoutError>> {
        self.errors.last()
    }

    pub fn take_last_error(&mut self) -> Option<Arc<FanoutError>> {
        self.errors.take()
    }

    /// True while an action is held whose `end_action` has not succeeded.
    #[must_use]
    pub fn has_unfinished_action(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|current| !current.is_finished())
    }

    /// Start one worker per Location and connect each of them. Does nothing when connected.
    ///
    /// # Errors
    ///
    /// `ConfigError` for duplicated Locations, or the connect failures (raise mode). The
    /// engine is torn down when any Location fails.
    pub fn connect(&mut self) -> Result<bool, FanoutError> {
        let result = self.try_connect();
        self.errors.settle_flag(result)
    }

    /// End the current action if it is unfinished, disconnect every Location and stop the
    /// engine. The engine is stopped even when ending the action or disconnecting fails.
    ///
    /// # Errors
    ///
    /// The first failure met on the way (raise mode).
    pub fn disconnect(&mut self) -> Result<bool, FanoutError> {
        let result = self.try_disconnect();
        self.errors.settle_flag(result)
    }

    /// Query action. Rows are read through its `get_result`.
    ///
    /// # Errors
    ///
    /// `PrevWorkNotFinished`, or `CodeSequence` when not connected (raise mode).
    pub fn select(&mut self) -> Settled<&mut QueryAction<D>> {
        self.install(QueryAction::new)
    }

    /// # Errors
    ///
    /// See [`DbTasks::select`].
    pub fn insert(&mut self, commit_limit: u64) -> Settled<&mut ExecuteAction<D>> {
        self.execute_family(ActionKind::Insert, commit_limit)
    }

    /// [`DbTasks::insert`] with the configured default commit limit.
    ///
    /// # Errors
    ///
    /// See [`DbTasks::select`].
    pub fn insert_default(&mut self) -> Settled<&mut ExecuteAction<D>> {
        self.insert(self.options.default_commit_limit)
    }

    /// # Errors
    ///
    /// See [`DbTasks::select`].
    pub fn update(&mut self, commit_limit: u64) -> Settled<&mut ExecuteAction<D>> {
        self.execute_family(ActionKind::Update, commit_limit)
    }

    /// # Errors
    ///
    /// See [`DbTasks::select`].
    pub fn delete(&mut self, commit_limit: u64) -> Settled<&mut ExecuteAction<D>> {
        self.execute_family(ActionKind::Delete, commit_limit)
    }

    /// Every truncate commits right away, whatever row count the backend reports for it.
    ///
    /// # Errors
    ///
    /// See [`DbTasks::select`].
    pub fn truncate(&mut self) -> Settled<&mut ExecuteAction<D>> {
        self.execute_family(ActionKind::Truncate, 1)
    }

    /// Arbitrary statements; commits only happen in `end_action`.
    ///
    /// # Errors
    ///
    /// See [`DbTasks::select`].
    pub fn execute(&mut self) -> Settled<&mut ExecuteAction<D>> {
        self.execute_family(ActionKind::Execute, 0)
    }

    /// # Errors
    ///
    /// See [`DbTasks::select`].
    pub fn batch_insert(
        &mut self,
        commit_limit: u64,
        values_per_batch: usize,
    ) -> Settled<&mut BatchAction<D>> {
        self.batch(BatchMode::Insert, commit_limit, values_per_batch)
    }

    /// [`DbTasks::batch_insert`] with the configured default limits.
    ///
    /// # Errors
    ///
    /// See [`DbTasks::select`].
    pub fn batch_insert_default(&mut self) -> Settled<&mut BatchAction<D>> {
        self.batch_insert(
            self.options.default_commit_limit,
            self.options.default_values_per_batch,
        )
    }

    /// Rows colliding with existing keys overwrite them.
    ///
    /// # Errors
    ///
    /// See [`DbTasks::select`].
    pub fn batch_replace(
        &mut self,
        commit_limit: u64,
        values_per_batch: usize,
    ) -> Settled<&mut BatchAction<D>> {
        self.batch(BatchMode::Replace, commit_limit, values_per_batch)
    }

    /// Rows colliding with existing keys are dropped.
    ///
    /// # Errors
    ///
    /// See [`DbTasks::select`].
    pub fn batch_insert_ignore(
        &mut self,
        commit_limit: u64,
        values_per_batch: usize,
    ) -> Settled<&mut BatchAction<D>> {
        self.batch(BatchMode::InsertIgnore, commit_limit, values_per_batch)
    }

    /// # Errors
    ///
    /// See [`DbTasks::select`].
    pub fn escape_string(&mut self) -> Settled<&mut EscapeStringAction<D>> {
        self.install(EscapeStringAction::new)
    }

    /// # Errors
    ///
    /// See [`DbTasks::select`].
    pub fn primary_keys(&mut self) -> Settled<&mut PrimaryKeyAction<D>> {
        self.install(PrimaryKeyAction::new)
    }

    fn execute_family(
        &mut self,
        kind: ActionKind,
        commit_limit: u64,
    ) -> Settled<&mut ExecuteAction<D>> {
        self.install(|engine, errors| ExecuteAction::new(engine, errors, kind, commit_limit))
    }

    fn batch(
        &mut self,
        mode: BatchMode,
        commit_limit: u64,
        values_per_batch: usize,
    ) -> Settled<&mut BatchAction<D>> {
        let keys = Box::new(CachedPrimaryKeys::new(Arc::clone(&self.driver)));
        self.install(move |engine, errors| {
            BatchAction::new(engine, errors, mode, commit_limit, values_per_batch, keys)
        })
    }

    fn install<A, F>(&mut self, build: F) -> Settled<&mut A>
    where
        A: Installable<D>,
        F: FnOnce(Arc<Engine<D>>, Arc<ErrorBox>) -> A,
    {
        let errors = Arc::clone(&self.errors);
        let result = self.try_install(build);
        errors.settle(result)
    }

    fn try_install<A, F>(&mut self, build: F) -> Result<&mut A, FanoutError>
    where
        A: Installable<D>,
        F: FnOnce(Arc<Engine<D>>, Arc<ErrorBox>) -> A,
    {
        if self.has_unfinished_action() {
            return Err(CodingError::PrevWorkNotFinished.into());
        }
        let engine = self
            .engine
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| FanoutError::sequence("connect before requesting an action"))?;
        let current = self
            .current
            .insert(build(engine, Arc::clone(&self.errors)).wrap());
        A::unwrap_mut(current)
            .ok_or_else(|| FanoutError::sequence("installed action has an unexpected type"))
    }

    fn try_connect(&mut self) -> Result<(), FanoutError> {
        if self.engine.is_some() {
            return Ok(());
        }
        let engine = Engine::start(
            Arc::clone(&self.driver),
            self.options.locations.clone(),
            self.options.queue_capacity,
        )?;
        let round = engine.dispatch_all(ActionKind::Connect, &Filter::default(), None)?;
        if !round.failures().is_empty() {
            // release the Locations that did connect
            let connected = round
                .replies()
                .keys()
                .map(|location| (location.clone(), Filter::default()))
                .collect();
            if let Err(err) = engine.dispatch(ActionKind::Disconnect, connected, None) {
                tracing::warn!(error = %err, "failed to release connections after connect failure");
            }
            engine.shutdown();
            return round.into_result().map(|_| ());
        }
        tracing::info!(locations = self.options.locations.len(), "connected");
        self.engine = Some(Arc::new(engine));
        Ok(())
    }

    fn try_disconnect(&mut self) -> Result<(), FanoutError> {
        let ended = match self.current.as_mut() {
            Some(current) if !current.is_finished() => {
                current.as_action().end_action().map(|_| ())
            }
            _ => Ok(()),
        };
        self.current = None;

        let Some(engine) = self.engine.take() else {
            return ended;
        };
        let disconnected = engine
            .dispatch_all(ActionKind::Disconnect, &Filter::default(), None)
            .and_then(|round| round.into_result().map(|_| ()));
        engine.shutdown();
        tracing::info!(locations = self.options.locations.len(), "disconnected");
        ended.and(disconnected)
    }
}

impl<D: ConnectionDriver> Drop for DbTasks<D> {
    fn drop(&mut self) {
        if self.engine.is_none() {
            return;
        }
        if let Err(err) = self.try_disconnect() {
            tracing::warn!(error = %err, "disconnect on drop failed");
        }
    }
}
