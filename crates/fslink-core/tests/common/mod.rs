//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use fslink_core::{
    Backend, BackendError, EngineConfig, ExecutionCache, ExecutionEngine, ResultHandle, RowSet,
    SqlDialect, SqliteBackend, Value,
};

/// SQLite backend that counts materialisations.
pub struct CountingBackend {
    inner: SqliteBackend,
    materializations: AtomicUsize,
    statements: parking_lot::Mutex<Vec<String>>,
}

impl CountingBackend {
    pub fn new() -> Self {
        Self {
            inner: SqliteBackend::in_memory().unwrap(),
            materializations: AtomicUsize::new(0),
            statements: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Number of `materialize_as` calls.
    pub fn materializations(&self) -> usize {
        self.materializations.load(Ordering::SeqCst)
    }

    /// Statements passed to `materialize_as`, in order.
    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().clone()
    }
}

impl Backend for CountingBackend {
    fn dialect(&self) -> &dyn SqlDialect {
        self.inner.dialect()
    }

    fn execute(&self, sql: &str) -> Result<RowSet, BackendError> {
        self.inner.execute(sql)
    }

    fn run(&self, sql: &str) -> Result<(), BackendError> {
        self.inner.run(sql)
    }

    fn table_exists(&self, physical_name: &str) -> Result<bool, BackendError> {
        self.inner.table_exists(physical_name)
    }

    fn register_rows(&self, physical_name: &str, rows: &RowSet) -> Result<(), BackendError> {
        self.inner.register_rows(physical_name, rows)
    }

    fn materialize_as(&self, sql: &str, physical_name: &str) -> Result<(), BackendError> {
        self.materializations.fetch_add(1, Ordering::SeqCst);
        self.statements.lock().push(sql.to_string());
        self.inner.materialize_as(sql, physical_name)
    }
}

/// Engine plus a handle on its counting backend.
pub struct TestContext {
    pub backend: Arc<CountingBackend>,
    pub engine: ExecutionEngine,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let backend = Arc::new(CountingBackend::new());
        let engine = ExecutionEngine::with_cache(
            backend.clone(),
            config,
            ExecutionCache::with_salt("itest"),
        );
        Self { backend, engine }
    }

    pub fn register(&self, name: &str, rows: &RowSet) -> ResultHandle {
        self.engine.register_table(name, rows, false).unwrap()
    }
}

/// `n` people with ids starting at `first_id`.
pub fn people(first_id: i64, n: usize) -> RowSet {
    RowSet::from_rows(
        ["unique_id", "first_name", "postcode"],
        (0..n as i64)
            .map(|i| {
                vec![
                    Value::Integer(first_id + i),
                    Value::Text(format!("name{}", i % 3)),
                    Value::Text(format!("PC{}", i % 2)),
                ]
            })
            .collect::<Vec<_>>(),
    )
}

/// People with the given postcodes.
pub fn with_postcodes(first_id: i64, postcodes: &[&str]) -> RowSet {
    RowSet::from_rows(
        ["unique_id", "first_name", "postcode"],
        postcodes
            .iter()
            .enumerate()
            .map(|(i, pc)| {
                vec![
                    Value::Integer(first_id + i as i64),
                    Value::Text(format!("name{}", i)),
                    Value::from(*pc),
                ]
            })
            .collect::<Vec<_>>(),
    )
}
