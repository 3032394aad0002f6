//! Execution engine.
//!
//! The engine owns the backend, the session's execution cache and the
//! engine configuration. Every statement any analysis issues goes through
//! here: pipelines are compiled, fingerprinted, looked up in the cache and
//! only then materialised in the backend.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, trace};

use crate::backend::Backend;
use crate::cache::ExecutionCache;
use crate::config::{EngineConfig, ExecutionMode};
use crate::dialect::{is_plain_identifier, SqlDialect};
use crate::error::Error;
use crate::handle::ResultHandle;
use crate::pipeline::{CompiledPipeline, QueryPipeline};
use crate::sql::{reads_table, reformat_statement};
use crate::value::{Record, RowSet};

/// Timing of one step executed in traced mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepTiming {
    /// Role of the step.
    pub output_role: String,
    /// Table the step was materialised into.
    pub physical_name: String,
    /// Wall-clock time spent in the backend.
    pub elapsed: Duration,
}

/// Runs pipelines and statements against a backend.
pub struct ExecutionEngine {
    backend: Arc<dyn Backend>,
    cache: ExecutionCache,
    config: EngineConfig,
    last_trace: Mutex<Vec<StepTiming>>,
    /// Tables materialised by traced runs, which later traced runs may replace.
    traced_tables: Mutex<HashSet<String>>,
}

impl ExecutionEngine {
    /// Create an engine with a fresh session cache.
    pub fn new(backend: Arc<dyn Backend>, config: EngineConfig) -> Self {
        Self::with_cache(backend, config, ExecutionCache::new())
    }

    /// Create an engine with an explicit cache.
    pub fn with_cache(backend: Arc<dyn Backend>, config: EngineConfig, cache: ExecutionCache) -> Self {
        debug!(
            dialect = backend.dialect().name(),
            session = cache.salt(),
            mode = ?config.execution_mode,
            "created execution engine"
        );
        Self {
            backend,
            cache,
            config,
            last_trace: Mutex::new(Vec::new()),
            traced_tables: Mutex::new(HashSet::new()),
        }
    }

    /// The backend.
    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// The backend's dialect.
    pub fn dialect(&self) -> &dyn SqlDialect {
        self.backend.dialect()
    }

    /// The session's execution cache.
    pub fn cache(&self) -> &ExecutionCache {
        &self.cache
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Identifier of this session.
    pub fn session_id(&self) -> &str {
        self.cache.salt()
    }

    /// Step timings of the most recent traced execution.
    pub fn last_trace(&self) -> Vec<StepTiming> {
        self.last_trace.lock().clone()
    }

    /// Compile and execute a pipeline, consuming it.
    pub fn execute_pipeline(&self, mut pipeline: QueryPipeline) -> Result<ResultHandle, Error> {
        let compiled = pipeline.compile()?;
        self.execute_compiled(&compiled)
    }

    /// Compile and execute a pipeline held by the caller.
    ///
    /// The pipeline is reset on success. On failure it is left compiled and
    /// the caller must [`reset`](QueryPipeline::reset) it before reuse.
    pub fn execute_pipeline_mut(&self, pipeline: &mut QueryPipeline) -> Result<ResultHandle, Error> {
        let compiled = pipeline.compile()?;
        let handle = self.execute_compiled(&compiled)?;
        pipeline.reset();
        Ok(handle)
    }

    /// Execute an already compiled pipeline in the configured mode.
    pub fn execute_compiled(&self, compiled: &CompiledPipeline) -> Result<ResultHandle, Error> {
        match self.config.execution_mode {
            ExecutionMode::Composed => self.sql_to_handle(
                compiled.composed_sql(),
                compiled.output_role(),
                self.config.use_cache,
            ),
            ExecutionMode::Traced => self.execute_traced(compiled),
        }
    }

    /// Materialise one statement under a cache-derived physical name.
    pub fn sql_to_handle(
        &self,
        sql: &str,
        templated_name: &str,
        use_cache: bool,
    ) -> Result<ResultHandle, Error> {
        self.cache
            .get_or_execute(sql, templated_name, use_cache, |physical_name| {
                self.execute_statement(sql, templated_name, physical_name)
            })
    }

    /// Materialise `sql` as `physical_name`, wrapping any backend failure.
    pub fn execute_statement(
        &self,
        sql: &str,
        templated_name: &str,
        physical_name: &str,
    ) -> Result<ResultHandle, Error> {
        debug!(templated_name, physical_name, "executing statement");
        trace!(sql, "statement text");

        self.backend
            .materialize_as(sql, physical_name)
            .map_err(|source| Error::PipelineExecution {
                templated_name: templated_name.to_string(),
                physical_name: physical_name.to_string(),
                statement: reformat_statement(sql, self.dialect()),
                source,
            })?;

        Ok(ResultHandle::created(
            templated_name,
            physical_name,
            sql,
            self.session_id(),
        ))
    }

    /// Run each part as its own table, in order, timing each one.
    ///
    /// Parts are materialised under their role names, so any existing table
    /// with that name that an earlier traced run did not create is refused
    /// before anything executes.
    fn execute_traced(&self, compiled: &CompiledPipeline) -> Result<ResultHandle, Error> {
        self.check_traced_targets(compiled)?;

        let mut timings = Vec::with_capacity(compiled.parts().len());
        let mut last = None;

        for part in compiled.parts() {
            info!(table = %part.output_role, "creating table");
            let start = Instant::now();
            let handle = self.execute_statement(&part.sql, &part.output_role, &part.output_role)?;
            let elapsed = start.elapsed();
            self.traced_tables.lock().insert(part.output_role.clone());
            info!(table = %part.output_role, elapsed = ?elapsed, "step complete");

            timings.push(StepTiming {
                output_role: part.output_role.clone(),
                physical_name: handle.physical_name.clone(),
                elapsed,
            });
            last = Some(handle);
        }

        *self.last_trace.lock() = timings;
        last.ok_or_else(|| Error::InvalidPipelineState("compiled pipeline has no steps".to_string()))
    }

    fn check_traced_targets(&self, compiled: &CompiledPipeline) -> Result<(), Error> {
        let mut clashes = Vec::new();
        for part in compiled.parts() {
            let role = &part.output_role;
            if !self.traced_tables.lock().contains(role) && self.backend.table_exists(role)? {
                clashes.push(role.clone());
            }
        }
        if clashes.is_empty() {
            return Ok(());
        }
        Err(Error::config(format!(
            "traced execution would replace existing table(s) {}; rename the pipeline roles or use composed mode",
            clashes.join(", ")
        )))
    }

    /// Execute a pipeline, read its rows and drop the result table.
    ///
    /// For analyses whose output is only needed in memory.
    pub fn collect_pipeline(&self, pipeline: QueryPipeline) -> Result<RowSet, Error> {
        let handle = self.execute_pipeline(pipeline)?;
        let rows = self.fetch(&handle)?;
        self.drop_handle(&handle)?;
        Ok(rows)
    }

    /// Run a query directly and return its rows.
    pub fn query(&self, sql: &str) -> Result<RowSet, Error> {
        trace!(sql, "running query");
        self.backend
            .execute(sql)
            .map_err(|source| Error::PipelineExecution {
                templated_name: "<query>".to_string(),
                physical_name: "<none>".to_string(),
                statement: reformat_statement(sql, self.dialect()),
                source,
            })
    }

    /// All rows of a materialised result.
    pub fn fetch(&self, handle: &ResultHandle) -> Result<RowSet, Error> {
        self.query(&format!("select * from {}", handle.physical_name))
    }

    /// All rows of a materialised result as records.
    pub fn fetch_records(&self, handle: &ResultHandle) -> Result<Vec<Record>, Error> {
        Ok(self.fetch(handle)?.records())
    }

    /// Column names of a materialised result.
    pub fn columns(&self, handle: &ResultHandle) -> Result<Vec<String>, Error> {
        Ok(self
            .query(&format!("select * from {} limit 0", handle.physical_name))?
            .columns)
    }

    /// Handle for a table that already exists in the backend.
    pub fn table_handle(&self, templated_name: &str, physical_name: &str) -> Result<ResultHandle, Error> {
        if !self.backend.table_exists(physical_name)? {
            return Err(Error::config(format!(
                "table `{}` does not exist in the backend",
                physical_name
            )));
        }
        Ok(ResultHandle::existing(templated_name, physical_name, self.session_id()))
    }

    /// Load in-memory rows as an input table.
    pub fn register_table(
        &self,
        name: &str,
        rows: &RowSet,
        overwrite: bool,
    ) -> Result<ResultHandle, Error> {
        let mut handles = self.register_tables(vec![(name.to_string(), rows)], overwrite)?;
        handles
            .pop()
            .ok_or_else(|| Error::invalid_data("registration produced no handle"))
    }

    /// Load several input tables.
    ///
    /// All names are checked before anything is written: if any table
    /// already exists and `overwrite` is false nothing is registered. A
    /// replaced table takes every cached result built from it along.
    pub fn register_tables(
        &self,
        tables: Vec<(String, &RowSet)>,
        overwrite: bool,
    ) -> Result<Vec<ResultHandle>, Error> {
        let mut existing = Vec::new();
        let mut replaced = Vec::new();
        for (name, _) in &tables {
            if !is_plain_identifier(name) {
                return Err(Error::config(format!(
                    "`{}` is not a valid table name; use letters, digits and underscores",
                    name
                )));
            }
            if self.backend.table_exists(name)? {
                if overwrite {
                    replaced.push(name.clone());
                } else {
                    existing.push(name.clone());
                }
            }
        }
        if !existing.is_empty() {
            return Err(Error::config(format!(
                "table(s) {} already exist in the backend; remove or rename them, or pass overwrite",
                existing.join(", ")
            )));
        }

        let mut handles = Vec::with_capacity(tables.len());
        for (name, rows) in tables {
            self.backend.register_rows(&name, rows)?;
            self.traced_tables.lock().remove(&name);
            handles.push(ResultHandle::existing(name.clone(), name, self.session_id()));
        }
        for name in &replaced {
            self.drop_results_reading(name)?;
        }
        Ok(handles)
    }

    /// Drop every cached result whose statement reads `table`, directly or
    /// through another cached result. Returns the number dropped.
    fn drop_results_reading(&self, table: &str) -> Result<usize, Error> {
        let mut stale = vec![table.to_string()];
        let mut dropped = 0;
        while let Some(name) = stale.pop() {
            for handle in self.cache.handles() {
                let reads = handle
                    .creating_statement
                    .as_deref()
                    .is_some_and(|sql| reads_table(sql, &name, self.dialect()));
                if reads {
                    self.drop_handle_force(&handle)?;
                    dropped += 1;
                    stale.push(handle.physical_name);
                }
            }
        }
        if dropped > 0 {
            info!(table, dropped, "dropped cached results built from replaced table");
        }
        Ok(dropped)
    }

    /// Drop a table the engine created and forget any cache entries for it.
    ///
    /// Refuses to drop registered inputs; use
    /// [`drop_handle_force`](Self::drop_handle_force) for those.
    pub fn drop_handle(&self, handle: &ResultHandle) -> Result<(), Error> {
        if !handle.is_engine_created() {
            return Err(Error::config(format!(
                "refusing to drop `{}`: it was not created by the engine",
                handle.physical_name
            )));
        }
        self.drop_handle_force(handle)
    }

    /// Drop any table and forget any cache entries for it.
    pub fn drop_handle_force(&self, handle: &ResultHandle) -> Result<(), Error> {
        self.backend.drop_table(&handle.physical_name)?;
        self.cache.invalidate(handle);
        debug!(physical_name = %handle.physical_name, "dropped table");
        Ok(())
    }
}
