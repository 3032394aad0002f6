//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Default prefix of every table the engine creates.
pub const DEFAULT_TABLE_PREFIX: &str = "__fslink__";

/// How a pipeline is sent to the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// All steps nested into one statement; only the final result is
    /// materialised, and it is cached.
    #[default]
    Composed,
    /// Each step materialised on its own, in order, bypassing the cache and
    /// timing every step. For locating the step that breaks.
    Traced,
}

/// Execution engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Composed or traced execution.
    pub execution_mode: ExecutionMode,
    /// Whether composed executions may reuse cached results.
    pub use_cache: bool,
    /// Prefix for the roles of tables created by analyses.
    pub table_prefix: String,
}

impl EngineConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the execution mode.
    pub fn with_execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = mode;
        self
    }

    /// Enable or disable result reuse.
    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    /// Set the table prefix.
    pub fn with_table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    /// Role name for an analysis table, e.g. `__fslink__df_concat`.
    pub fn role(&self, name: &str) -> String {
        format!("{}{}", self.table_prefix, name)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            execution_mode: ExecutionMode::Composed,
            use_cache: true,
            table_prefix: DEFAULT_TABLE_PREFIX.to_string(),
        }
    }
}
