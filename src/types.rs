use chrono::NaiveDateTime;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::ErrorKind;

/// One cell of a fetched row.
///
/// Drivers translate their native column values into this enum so rows look
/// the same whatever backend produced them:
/// ```rust
/// use sql_fanout::prelude::*;
///
/// let cells = vec![RowValues::Int(7), RowValues::Text("alice".into()), RowValues::Null];
/// assert_eq!(cells[1].byte_len(), 5);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RowValues {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
    Timestamp(NaiveDateTime),
    Null,
    JSON(JsonValue),
    Blob(Vec<u8>),
}

impl RowValues {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Bool(flag) => Some(i64::from(*flag)),
            Self::Text(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let Self::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            #[allow(clippy::cast_precision_loss)]
            Self::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let Self::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Timestamp(value) => Some(*value),
            Self::Text(text) => NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
                .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
                .ok(),
            _ => None,
        }
    }

    /// Text rendering of the cell as a client library would hand it out; `None` for NULL.
    #[must_use]
    pub fn to_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Int(value) => Some(value.to_string()),
            Self::Float(value) => Some(value.to_string()),
            Self::Text(value) => Some(value.clone()),
            Self::Bool(flag) => Some(if *flag { "1" } else { "0" }.to_string()),
            Self::Timestamp(value) => Some(value.format("%Y-%m-%d %H:%M:%S").to_string()),
            Self::JSON(value) => Some(value.to_string()),
            Self::Blob(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        }
    }

    /// Length in bytes of the cell's text rendering (blobs: raw length, NULL: 0).
    #[must_use]
    pub fn byte_len(&self) -> usize {
        match self {
            Self::Blob(bytes) => bytes.len(),
            Self::Text(text) => text.len(),
            other => other.to_text().map_or(0, |text| text.len()),
        }
    }
}

/// SQL dialect spoken by a connection driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// MySQL / MariaDB
    Mysql,
    /// IBM DB2
    Db2,
    /// `SQLite`
    Sqlite,
}

impl Dialect {
    /// Whether a native error code reports a unique or primary key violation.
    #[must_use]
    pub fn is_duplicate_key(self, code: i64) -> bool {
        match self {
            Self::Mysql => code == 1062,
            Self::Db2 => code == -803,
            // SQLITE_CONSTRAINT_PRIMARYKEY, SQLITE_CONSTRAINT_UNIQUE
            Self::Sqlite => code == 1555 || code == 2067,
        }
    }

    /// Escape raw bytes so they can sit between single quotes in a statement.
    #[must_use]
    pub fn escape_literal(self, raw: &[u8]) -> String {
        let text = String::from_utf8_lossy(raw);
        let mut out = String::with_capacity(text.len() + 8);
        for ch in text.chars() {
            match (self, ch) {
                (Self::Mysql, '\0') | (Self::Db2, '\0') => out.push_str("\\0"),
                (Self::Mysql, '\n') | (Self::Db2, '\n') => out.push_str("\\n"),
                (Self::Mysql, '\r') | (Self::Db2, '\r') => out.push_str("\\r"),
                (Self::Mysql, '\\') => out.push_str("\\\\"),
                (Self::Mysql, '\'') => out.push_str("\\'"),
                (Self::Mysql, '"') => out.push_str("\\\""),
                (Self::Mysql, '\x1a') => out.push_str("\\Z"),
                (Self::Db2, '\t') => out.push_str("\\t"),
                (Self::Db2, '\'') | (Self::Sqlite, '\'') => out.push_str("''"),
                (Self::Sqlite, '\0') => out.push_str("'||char(0)||'"),
                (_, other) => out.push(other),
            }
        }
        out
    }
}

/// Primitive operation a worker performs against one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Connect,
    Disconnect,
    Query,
    Fetch,
    ColumnLengths,
    CloseResult,
    Commit,
    AffectedRows,
    Delete,
    Update,
    Truncate,
    Insert,
    Execute,
    Escape,
}

impl ActionKind {
    /// Mutating kinds feed the affected-row counter and the commit judge.
    #[must_use]
    pub fn is_mutation(self) -> bool {
        matches!(
            self,
            Self::Delete | Self::Update | Self::Truncate | Self::Insert | Self::Execute
        )
    }

    /// Error kind reported when the driver fails this operation.
    #[must_use]
    pub fn failure_kind(self) -> ErrorKind {
        match self {
            Self::Connect => ErrorKind::ConnectFailure,
            Self::Disconnect => ErrorKind::DisconnectFailure,
            Self::Query => ErrorKind::QueryExecuteFailure,
            Self::Fetch => ErrorKind::FetchRowFailure,
            Self::ColumnLengths => ErrorKind::GetColumnLengthFailure,
            Self::CloseResult => ErrorKind::CloseResultFailure,
            Self::Commit => ErrorKind::CommitFailure,
            Self::AffectedRows => ErrorKind::AffectedRowsFailure,
            Self::Delete => ErrorKind::DeleteFailure,
            Self::Update => ErrorKind::UpdateFailure,
            Self::Truncate => ErrorKind::TruncateFailure,
            Self::Insert => ErrorKind::InsertFailure,
            Self::Execute => ErrorKind::ExecuteFailure,
            Self::Escape => ErrorKind::EscapeFailure,
        }
    }
}
