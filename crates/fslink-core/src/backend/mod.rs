//! Backend adapters.
//!
//! A backend executes single compiled statements. Everything above this
//! layer (pipelines, caching, analyses) is backend agnostic and talks to the
//! backend only through the [`Backend`] trait.

pub mod sqlite;

pub use sqlite::SqliteBackend;

use thiserror::Error;

use crate::dialect::SqlDialect;
use crate::value::RowSet;

/// Errors reported by a backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// SQLite error.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// Generic execution failure reported by an adapter.
    #[error("{0}")]
    Execution(String),

    /// Input rows do not match their declared columns.
    #[error("row {row} has {found} values but {expected} columns were declared")]
    RowShape {
        /// Zero-based row index.
        row: usize,
        /// Number of declared columns.
        expected: usize,
        /// Number of values in the row.
        found: usize,
    },
}

/// A relational backend that executes statements.
///
/// Implementations must be safe to share across threads; the engine holds
/// the backend behind an `Arc`.
pub trait Backend: Send + Sync {
    /// Statement templates for this backend.
    fn dialect(&self) -> &dyn SqlDialect;

    /// Execute a query and return its rows.
    fn execute(&self, sql: &str) -> Result<RowSet, BackendError>;

    /// Execute a statement that returns no rows.
    fn run(&self, sql: &str) -> Result<(), BackendError>;

    /// Check if a table (or view) exists.
    fn table_exists(&self, physical_name: &str) -> Result<bool, BackendError>;

    /// Create a table from in-memory rows, replacing any existing table.
    fn register_rows(&self, physical_name: &str, rows: &RowSet) -> Result<(), BackendError>;

    /// Materialise `sql` as a table named `physical_name`.
    ///
    /// Any previous table of that name is dropped first.
    fn materialize_as(&self, sql: &str, physical_name: &str) -> Result<(), BackendError> {
        self.drop_table(physical_name)?;
        self.run(&self.dialect().create_table_as(physical_name, sql))
    }

    /// Drop a table if it exists.
    fn drop_table(&self, physical_name: &str) -> Result<(), BackendError> {
        self.run(&self.dialect().drop_table_if_exists(physical_name))
    }
}
