use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::location::Location;

/// Failure classification shared by every error this crate produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ConnectFailure,
    DisconnectFailure,
    QueryOpenFailure,
    QueryExecuteFailure,
    FetchRowFailure,
    GetColumnLengthFailure,
    CloseResultFailure,
    CommitFailure,
    AffectedRowsFailure,
    /// Generic statement execution.
    ExecuteFailure,
    DeleteFailure,
    UpdateFailure,
    TruncateFailure,
    InsertFailure,
    /// Insert rejected because of a unique or primary key violation.
    InsertDuplicateKey,
    EscapeFailure,
    /// Programmer misuse of the API sequence.
    CodingError,
    NotFound,
    ConfigError,
    ConnectionError,
}

impl ErrorKind {
    /// True for every statement-execution kind, duplicate keys included.
    #[must_use]
    pub fn is_execute_failure(self) -> bool {
        matches!(
            self,
            Self::ExecuteFailure
                | Self::DeleteFailure
                | Self::UpdateFailure
                | Self::TruncateFailure
                | Self::InsertFailure
                | Self::InsertDuplicateKey
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ConnectFailure => "connect failure",
            Self::DisconnectFailure => "disconnect failure",
            Self::QueryOpenFailure => "query open failure",
            Self::QueryExecuteFailure => "query execute failure",
            Self::FetchRowFailure => "fetch row failure",
            Self::GetColumnLengthFailure => "column length failure",
            Self::CloseResultFailure => "close result failure",
            Self::CommitFailure => "commit failure",
            Self::AffectedRowsFailure => "affected rows failure",
            Self::ExecuteFailure => "execute failure",
            Self::DeleteFailure => "delete failure",
            Self::UpdateFailure => "update failure",
            Self::TruncateFailure => "truncate failure",
            Self::InsertFailure => "insert failure",
            Self::InsertDuplicateKey => "duplicate key on insert",
            Self::EscapeFailure => "escape failure",
            Self::CodingError => "coding error",
            Self::NotFound => "not found",
            Self::ConfigError => "configuration error",
            Self::ConnectionError => "connection error",
        };
        f.write_str(name)
    }
}

/// One driver-level failure on one Location.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverFailure {
    pub kind: ErrorKind,
    pub location: Location,
    pub message: String,
    /// Native error code reported by the driver.
    pub code: i64,
    /// Statement that was being executed, when there was one.
    pub statement: Option<String>,
}

impl fmt::Display for DriverFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} on {}: {} (code {})",
            self.kind, self.location, self.message, self.code
        )?;
        if let Some(statement) = &self.statement {
            write!(f, " while running [{statement}]")?;
        }
        Ok(())
    }
}

impl std::error::Error for DriverFailure {}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodingError {
    #[error("previous action has not finished; call end_action first")]
    PrevWorkNotFinished,

    #[error("operation out of sequence: {0}")]
    CodeSequence(String),

    #[error("dispatched {works} work items but collected {results} results")]
    WorkResultMismatch { works: usize, results: usize },
}

#[derive(Debug, Error)]
pub enum FanoutError {
    #[error("{}", describe_failures(.failures, .succeeded))]
    Locations {
        failures: Vec<DriverFailure>,
        succeeded: Vec<Location>,
    },

    #[error(transparent)]
    Coding(#[from] CodingError),

    #[error("{what} not found: {detail}")]
    NotFound { what: &'static str, detail: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl FanoutError {
    /// Classify the error. A multi-Location failure reports the kind of its first failure.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Locations { failures, .. } => failures
                .first()
                .map_or(ErrorKind::ConnectionError, |failure| failure.kind),
            Self::Coding(_) => ErrorKind::CodingError,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::ConfigError(_) | Self::Json(_) => ErrorKind::ConfigError,
            Self::ConnectionError(_) => ErrorKind::ConnectionError,
        }
    }

    /// Driver failures carried by this error, keyed implicitly by their Location.
    #[must_use]
    pub fn failures(&self) -> &[DriverFailure] {
        match self {
            Self::Locations { failures, .. } => failures,
            _ => &[],
        }
    }

    /// Locations that completed successfully in the round that produced this error.
    #[must_use]
    pub fn succeeded(&self) -> &[Location] {
        match self {
            Self::Locations { succeeded, .. } => succeeded,
            _ => &[],
        }
    }

    pub(crate) fn not_found(what: &'static str, detail: impl Into<String>) -> Self {
        Self::NotFound {
            what,
            detail: detail.into(),
        }
    }

    pub(crate) fn sequence(detail: impl Into<String>) -> Self {
        Self::Coding(CodingError::CodeSequence(detail.into()))
    }
}

impl From<DriverFailure> for FanoutError {
    fn from(failure: DriverFailure) -> Self {
        Self::Locations {
            failures: vec![failure],
            succeeded: Vec::new(),
        }
    }
}

fn describe_failures(failures: &[DriverFailure], succeeded: &[Location]) -> String {
    let total = failures.len() + succeeded.len();
    match failures {
        [single] if succeeded.is_empty() => single.to_string(),
        _ => {
            let details = failures
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            format!("{} of {total} locations failed: {details}", failures.len())
        }
    }
}

/// How failures reach the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PropagationMode {
    /// Return every failure as `Err` at the point of detection.
    #[default]
    Raise,
    /// Store the failure in the error box and report `Ok(None)` / `Ok(false)`.
    Accumulate,
}

/// Outcome of an operation under the facade's propagation mode.
///
/// `Ok(None)` only appears in [`PropagationMode::Accumulate`], after the failure was stored
/// and can be read back through `DbTasks::last_error`.
pub type Settled<T> = Result<Option<T>, FanoutError>;

/// Holds the propagation mode and the most recent accumulated failure for one facade.
#[derive(Debug, Default)]
pub struct ErrorBox {
    mode: Mutex<PropagationMode>,
    last: Mutex<Option<Arc<FanoutError>>>,
}

impl ErrorBox {
    #[must_use]
    pub fn new(mode: PropagationMode) -> Self {
        Self {
            mode: Mutex::new(mode),
            last: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn mode(&self) -> PropagationMode {
        *self.mode.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_mode(&self, mode: PropagationMode) {
        *self.mode.lock().unwrap_or_else(PoisonError::into_inner) = mode;
    }

    #[must_use]
    pub fn last(&self) -> Option<Arc<FanoutError>> {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn take(&self) -> Option<Arc<FanoutError>> {
        self.last.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    fn store(&self, err: FanoutError) {
        tracing::debug!(error = %err, "accumulating failure");
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(err));
    }

    /// Apply the propagation mode to a result.
    ///
    /// # Errors
    ///
    /// Returns the error unchanged in [`PropagationMode::Raise`].
    pub fn settle<T>(&self, result: Result<T, FanoutError>) -> Settled<T> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(err) => match self.mode() {
                PropagationMode::Raise => Err(err),
                PropagationMode::Accumulate => {
                    self.store(err);
                    Ok(None)
                }
            },
        }
    }

    /// [`ErrorBox::settle`] for operations that only report success.
    ///
    /// # Errors
    ///
    /// Returns the error unchanged in [`PropagationMode::Raise`].
    pub fn settle_flag(&self, result: Result<(), FanoutError>) -> Result<bool, FanoutError> {
        self.settle(result).map(|outcome| outcome.is_some())
    }
}
