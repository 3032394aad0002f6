//! fslink Command-Line Client
//!
//! Runs blocking analysis, profiling and match weight breakdowns over JSON
//! record files loaded into an in-memory SQLite backend.

mod commands;
mod formatter;
mod loader;

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use commands::Command;
use formatter::OutputFormat;
use fslink_core::{EngineConfig, ExecutionEngine, ExecutionMode, LinkageSettings, SqliteBackend};
use tracing::info;

/// How pipelines are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// One nested statement per pipeline, cached
    Composed,
    /// Every step materialised and timed
    Traced,
}

impl From<Mode> for ExecutionMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Composed => ExecutionMode::Composed,
            Mode::Traced => ExecutionMode::Traced,
        }
    }
}

/// fslink Command-Line Client
#[derive(Parser, Debug)]
#[command(name = "fslink")]
#[command(version, about = "Record linkage analysis over JSON record files")]
pub struct Args {
    /// Linkage settings file (JSON)
    #[arg(short, long)]
    pub settings: PathBuf,

    /// Input record files (JSON arrays of objects); one table per file
    #[arg(short, long = "input")]
    pub inputs: Vec<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", value_enum)]
    pub format: OutputFormat,

    /// Pipeline execution mode
    #[arg(long, default_value = "composed", value_enum)]
    pub mode: Mode,

    /// Re-execute identical statements instead of reusing results
    #[arg(long)]
    pub no_cache: bool,

    /// Prefix for tables created during analysis
    #[arg(long)]
    pub table_prefix: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

impl From<&Args> for EngineConfig {
    fn from(args: &Args) -> Self {
        let config = EngineConfig::new()
            .with_execution_mode(args.mode.into())
            .with_cache(!args.no_cache);
        match &args.table_prefix {
            Some(prefix) => config.with_table_prefix(prefix.clone()),
            None => config,
        }
    }
}

fn main() {
    // Initialize tracing; logs go to stderr so stdout stays parseable
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fslink=info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let settings = LinkageSettings::from_path(&args.settings)?;
    let engine = ExecutionEngine::new(Arc::new(SqliteBackend::in_memory()?), EngineConfig::from(&args));

    let mut inputs = Vec::new();
    if args.command.needs_inputs() {
        if args.inputs.is_empty() {
            return Err("at least one --input file is required".into());
        }
        let tables = args
            .inputs
            .iter()
            .map(|path| loader::load_table(path))
            .collect::<Result<Vec<_>, _>>()?;
        for table in &tables {
            info!(table = %table.name, rows = table.rows.len(), "Loaded input");
        }
        inputs = engine.register_tables(
            tables.iter().map(|t| (t.name.clone(), &t.rows)).collect(),
            false,
        )?;
    }

    let formatter = formatter::create_formatter(args.format);
    let output = commands::execute(&engine, settings, inputs, &args.command)?;

    println!("{}", formatter.format_rows(&output.rows));
    if let Some(summary) = output.summary.as_deref().and_then(|s| formatter.format_summary(s)) {
        println!("{}", summary);
    }

    let stats = engine.cache().stats();
    info!(
        hits = stats.hits(),
        misses = stats.misses(),
        "Execution cache"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_to_engine_config() {
        let args = Args::parse_from([
            "fslink",
            "--settings",
            "settings.json",
            "--input",
            "a.json",
            "--input",
            "b.json",
            "--mode",
            "traced",
            "--no-cache",
            "--table-prefix",
            "tmp_",
            "blocking",
            "--rule",
            "l.surname = r.surname",
        ]);
        let config = EngineConfig::from(&args);

        assert_eq!(args.inputs.len(), 2);
        assert_eq!(config.execution_mode, ExecutionMode::Traced);
        assert!(!config.use_cache);
        assert_eq!(config.table_prefix, "tmp_");
        match args.command {
            Command::Blocking { rules } => assert_eq!(rules, vec!["l.surname = r.surname"]),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_default_engine_config() {
        let args = Args::parse_from(["fslink", "-s", "settings.json", "missingness"]);
        assert_eq!(EngineConfig::from(&args), EngineConfig::default());
        assert_eq!(args.format, OutputFormat::Table);
    }
}
