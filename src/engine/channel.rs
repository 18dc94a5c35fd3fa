use std::sync::Arc;

use crate::error::DriverFailure;
use crate::filter::Filter;
use crate::location::Location;
use crate::results::ColumnIndex;
use crate::types::{ActionKind, RowValues};

use super::commit::AffectedRowRecorder;

/// What a primitive operation produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Done,
    Columns(Arc<ColumnIndex>),
    Row(Option<Vec<RowValues>>),
    Lengths(Vec<usize>),
    Rows(u64),
    /// Raw status of a generic execute.
    Status(i64),
    Escaped(String),
}

impl Reply {
    /// Rows this reply adds to the affected-row counter.
    #[must_use]
    pub fn affected(&self) -> u64 {
        match self {
            Self::Rows(rows) => *rows,
            _ => 0,
        }
    }
}

/// One Location's share of a dispatch. The recorder travels with the work and comes back
/// in the completion, so the worker can update it without shared state.
pub(crate) struct WorkItem {
    pub(crate) location: Location,
    pub(crate) kind: ActionKind,
    pub(crate) filter: Filter,
    pub(crate) recorder: Option<AffectedRowRecorder>,
}

pub(crate) enum Command {
    Run(WorkItem),
    Shutdown,
}

pub(crate) struct Completion {
    pub(crate) location: Location,
    pub(crate) outcome: Result<Reply, DriverFailure>,
    pub(crate) recorder: Option<AffectedRowRecorder>,
}
