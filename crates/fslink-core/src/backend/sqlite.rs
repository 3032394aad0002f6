//! SQLite backend.
//!
//! Runs statements against a single `rusqlite` connection, in memory or on
//! disk. The connection is guarded by a mutex so the backend can be shared
//! across threads.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use tracing::debug;

use crate::dialect::{SqlDialect, SqliteDialect};
use crate::value::{RowSet, Value};

use super::{Backend, BackendError};

/// SQLite backend.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
    dialect: SqliteDialect,
}

impl SqliteBackend {
    /// Create a backend over a new in-memory database.
    pub fn in_memory() -> Result<Self, BackendError> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BackendError> {
        Ok(Self::from_connection(Connection::open(path)?))
    }

    /// Wrap an existing connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            dialect: SqliteDialect,
        }
    }
}

impl Backend for SqliteBackend {
    fn dialect(&self) -> &dyn SqlDialect {
        &self.dialect
    }

    fn execute(&self, sql: &str) -> Result<RowSet, BackendError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();

        let mut out = Vec::new();
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(Value::from(row.get_ref(i)?));
            }
            out.push(values);
        }

        Ok(RowSet::new(columns, out))
    }

    fn run(&self, sql: &str) -> Result<(), BackendError> {
        self.conn.lock().execute_batch(sql)?;
        Ok(())
    }

    fn table_exists(&self, physical_name: &str) -> Result<bool, BackendError> {
        let count: i64 = self.conn.lock().query_row(
            "SELECT count(*) FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
            [physical_name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn register_rows(&self, physical_name: &str, rows: &RowSet) -> Result<(), BackendError> {
        let width = rows.columns.len();
        if let Some((idx, row)) = rows.rows.iter().enumerate().find(|(_, r)| r.len() != width) {
            return Err(BackendError::RowShape {
                row: idx,
                expected: width,
                found: row.len(),
            });
        }

        let columns: Vec<String> = rows
            .columns
            .iter()
            .map(|c| self.dialect.quote_identifier(c))
            .collect();
        let placeholders: Vec<String> = (1..=width).map(|i| format!("?{}", i)).collect();

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {name}; CREATE TABLE {name} ({cols});",
            name = physical_name,
            cols = columns.join(", ")
        ))?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} ({}) VALUES ({})",
                physical_name,
                columns.join(", "),
                placeholders.join(", ")
            ))?;
            for row in &rows.rows {
                stmt.execute(params_from_iter(row.iter()))?;
            }
        }
        tx.commit()?;

        debug!(table = physical_name, rows = rows.len(), "registered input table");
        Ok(())
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Integer(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            Value::Real(f) => ToSqlOutput::Owned(SqlValue::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(f) => Value::Real(f),
            ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(bytes) => Value::Text(hex::encode(bytes)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> RowSet {
        RowSet::from_rows(
            ["unique_id", "first_name", "score"],
            vec![
                vec![Value::Integer(1), "amy".into(), Value::Real(0.5)],
                vec![Value::Integer(2), "bob".into(), Value::Null],
            ],
        )
    }

    #[test]
    fn test_register_and_query() {
        let backend = SqliteBackend::in_memory().unwrap();
        backend.register_rows("people", &people()).unwrap();

        let result = backend
            .execute("select unique_id, first_name, score from people order by unique_id")
            .unwrap();
        assert_eq!(result.columns, vec!["unique_id", "first_name", "score"]);
        assert_eq!(result.rows[0][1], Value::Text("amy".into()));
        assert_eq!(result.rows[1][2], Value::Null);
    }

    #[test]
    fn test_register_replaces_existing() {
        let backend = SqliteBackend::in_memory().unwrap();
        backend.register_rows("people", &people()).unwrap();
        backend
            .register_rows("people", &RowSet::from_rows(["x"], vec![vec![Value::Integer(9)]]))
            .unwrap();

        let result = backend.execute("select * from people").unwrap();
        assert_eq!(result.columns, vec!["x"]);
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn test_register_rejects_ragged_rows() {
        let backend = SqliteBackend::in_memory().unwrap();
        let rows = RowSet::new(vec!["a".into(), "b".into()], vec![vec![Value::Integer(1)]]);
        let err = backend.register_rows("t", &rows).unwrap_err();
        assert!(matches!(err, BackendError::RowShape { row: 0, expected: 2, found: 1 }));
    }

    #[test]
    fn test_materialize_and_drop() {
        let backend = SqliteBackend::in_memory().unwrap();
        backend.register_rows("people", &people()).unwrap();

        backend
            .materialize_as("select count(*) as n from people", "people_count")
            .unwrap();
        assert!(backend.table_exists("people_count").unwrap());
        assert_eq!(
            backend.execute("select n from people_count").unwrap().scalar_u64().unwrap(),
            2
        );

        // Materialising again over an existing table replaces it
        backend
            .materialize_as("select 5 as n", "people_count")
            .unwrap();
        assert_eq!(
            backend.execute("select n from people_count").unwrap().scalar_u64().unwrap(),
            5
        );

        backend.drop_table("people_count").unwrap();
        assert!(!backend.table_exists("people_count").unwrap());
    }

    #[test]
    fn test_error_message_preserved() {
        let backend = SqliteBackend::in_memory().unwrap();
        let err = backend.execute("select * from no_such_table").unwrap_err();
        assert!(err.to_string().contains("no_such_table"));
    }
}
