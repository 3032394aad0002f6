//! fslink core - query pipeline, execution cache and linkage analyses.
//!
//! Every step of a linkage analysis is expressed as SQL and run against a
//! pluggable relational [`Backend`]. Steps are collected in a
//! [`QueryPipeline`], executed by the [`ExecutionEngine`] and deduplicated
//! by the session's [`ExecutionCache`].
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use fslink_core::{
//!     BlockingAnalyzer, EngineConfig, ExecutionEngine, LinkType, LinkageSession,
//!     LinkageSettings, SqliteBackend,
//! };
//!
//! let engine = ExecutionEngine::new(Arc::new(SqliteBackend::in_memory()?), EngineConfig::default());
//! let people = engine.register_table("people", &rows, false)?;
//!
//! let settings = LinkageSettings::new(LinkType::DedupeOnly)
//!     .with_blocking_rules(["l.surname = r.surname", "l.dob = r.dob"]);
//! let session = LinkageSession::new(&engine, settings, vec![people])?;
//!
//! let report = BlockingAnalyzer::new(&session).cumulative_comparisons_from_settings()?;
//! println!("{} of {} pairs compared", report.total_comparisons(), report.cartesian);
//! ```

pub mod backend;
pub mod blocking;
pub mod cache;
pub mod comparison;
pub mod config;
pub mod dialect;
pub mod engine;
pub mod error;
pub mod handle;
pub mod pipeline;
pub mod probability;
pub mod profiling;
pub mod session;
pub mod settings;
pub mod sql;
pub mod value;
pub mod waterfall;

pub use backend::{Backend, BackendError, SqliteBackend};
pub use blocking::{
    BlockingAnalyzer, BlockingReport, BlockingRule, CumulativeBlockingResult, PreFilterOptions,
};
pub use cache::{CacheStats, ExecutionCache, Fingerprint};
pub use comparison::{Comparison, ComparisonLevel, TfAdjustment};
pub use config::{EngineConfig, ExecutionMode};
pub use dialect::{DuckDbDialect, PostgresDialect, SqlDialect, SqliteDialect};
pub use engine::{ExecutionEngine, StepTiming};
pub use error::Error;
pub use handle::ResultHandle;
pub use pipeline::{CompiledPipeline, QueryPipeline, QueryStep};
pub use profiling::{CompletenessRow, MissingnessRow, Profiler};
pub use session::LinkageSession;
pub use settings::{LinkType, LinkageSettings};
pub use value::{Record, RowSet, Value};
pub use waterfall::{Waterfall, WaterfallRecord};

/// Result type for fslink operations.
pub type Result<T> = std::result::Result<T, Error>;
