//! Run one logical database operation against a fixed set of connections at once.
//!
//! A [`DbTasks`] facade owns one worker thread per [`Location`]. Actions created from the
//! facade (queries, inserts, batched multi-value inserts, escaping, primary-key lookups)
//! fan each call out to the workers, or run inline when a single Location is targeted,
//! and collect the outcome per Location. Row-changing actions commit on their own every
//! `commit_limit` affected rows.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sql_fanout::prelude::*;
//!
//! # fn main() -> Result<(), FanoutError> {
//! let mut tasks = TasksOptionsBuilder::new()
//!     .location(Location::sqlite("shard0.db"))
//!     .location(Location::sqlite("shard1.db"))
//!     .build(SqliteDriver::new())?;
//! tasks.connect()?;
//!
//! if let Some(select) = tasks.select()? {
//!     select.run(&Filter::new("SELECT id, name FROM users"))?;
//!     if let Some(mut rows) = select.get_result()? {
//!         while let Some(row) = rows.fetch()? {
//!             if row.is_empty() {
//!                 break;
//!             }
//!             println!("{:?}", row.get("name")?);
//!         }
//!     }
//!     select.end_action()?;
//! }
//! tasks.disconnect()?;
//! # Ok(())
//! # }
//! ```

pub mod action;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod filter;
pub mod location;
pub mod prelude;
pub mod results;
pub mod statement;
pub mod tasks;
pub mod types;
pub mod value;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use action::DbAction;
pub use config::{TasksOptions, TasksOptionsBuilder};
pub use error::{ErrorKind, FanoutError, PropagationMode, Settled};
pub use filter::{BatchFilter, Filter};
pub use location::Location;
pub use tasks::DbTasks;
