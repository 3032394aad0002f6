//! Subcommand execution.

use std::path::PathBuf;

use clap::Subcommand;
use fslink_core::{
    BlockingAnalyzer, BlockingReport, BlockingRule, CompletenessRow, ExecutionEngine, LinkageSession,
    LinkageSettings, MissingnessRow, PreFilterOptions, Profiler, ResultHandle, RowSet, Value,
    Waterfall, WaterfallRecord,
};
use tracing::info;

use crate::loader;

/// Analyses the CLI can run.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Pairs generated by each blocking rule after the rules before it
    Blocking {
        /// Rules to analyse instead of the settings' prediction rules
        #[arg(short, long = "rule")]
        rules: Vec<String>,
    },

    /// Estimate comparisons for one rule, before and after link-type filtering
    Estimate {
        /// Blocking rule, e.g. "l.surname = r.surname"
        rule: String,

        /// Fail instead of falling back to the cartesian product for rules
        /// without equi-join keys
        #[arg(long)]
        no_fallback: bool,
    },

    /// Null counts of every input column
    Missingness,

    /// Completeness of each column per source dataset
    Completeness {
        /// Columns to profile; defaults to the comparison input columns
        #[arg(short, long = "column")]
        columns: Vec<String>,
    },

    /// Break scored pairs down into match weight contributions
    Waterfall {
        /// JSON file of scored pairs
        records: PathBuf,
    },
}

impl Command {
    /// Whether the command reads the input tables.
    pub fn needs_inputs(&self) -> bool {
        !matches!(self, Command::Waterfall { .. })
    }
}

/// Result of a command: rows plus an optional summary line.
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub rows: RowSet,
    pub summary: Option<String>,
}

impl Output {
    fn rows(rows: RowSet) -> Self {
        Self {
            rows,
            summary: None,
        }
    }
}

/// Run an analysis.
///
/// `inputs` may be empty for commands that do not read input tables.
pub fn execute(
    engine: &ExecutionEngine,
    settings: LinkageSettings,
    inputs: Vec<ResultHandle>,
    command: &Command,
) -> Result<Output, Box<dyn std::error::Error>> {
    match command {
        Command::Blocking { rules } => {
            let session = LinkageSession::new(engine, settings, inputs)?;
            let analyzer = BlockingAnalyzer::new(&session);
            let report = if rules.is_empty() {
                analyzer.cumulative_comparisons_from_settings()?
            } else {
                let parsed = analyzer.parse_rules(rules.iter().cloned());
                analyzer.cumulative_comparisons(&parsed)?
            };
            Ok(blocking_output(&report))
        }
        Command::Estimate { rule, no_fallback } => {
            let session = LinkageSession::new(engine, settings, inputs)?;
            estimate(&session, rule, !no_fallback)
        }
        Command::Missingness => {
            let session = LinkageSession::new(engine, settings, inputs)?;
            let rows = Profiler::new(&session).missingness(None)?;
            Ok(Output::rows(missingness_rows(&rows)))
        }
        Command::Completeness { columns } => {
            let session = LinkageSession::new(engine, settings, inputs)?;
            let profiler = Profiler::new(&session);
            let rows = if columns.is_empty() {
                profiler.completeness(None)?
            } else {
                profiler.completeness(Some(columns.as_slice()))?
            };
            Ok(Output::rows(completeness_rows(&rows)))
        }
        Command::Waterfall { records } => {
            let items = waterfall(&settings, records)?;
            Ok(Output::rows(waterfall_rows(&items)))
        }
    }
}

fn estimate(
    session: &LinkageSession<'_>,
    rule: &str,
    allow_cartesian_fallback: bool,
) -> Result<Output, Box<dyn std::error::Error>> {
    let analyzer = BlockingAnalyzer::new(session);
    let rule = &BlockingRule::new(rule, session.engine().dialect());
    let options = PreFilterOptions {
        allow_cartesian_fallback,
    };
    let pre_filter = analyzer.estimate_pre_filter(rule, options)?;
    let post_filter = analyzer.count_post_filter(rule)?;
    info!(rule = %rule, pre_filter, post_filter, "Estimated comparisons");

    let keys: Vec<String> = rule
        .equi_join_keys()
        .iter()
        .map(|(l, r)| format!("{} = {}", l, r))
        .collect();
    Ok(Output::rows(RowSet::from_rows(
        ["rule", "equi_join_keys", "pre_filter", "post_filter"],
        vec![vec![
            Value::from(rule.predicate()),
            Value::from(keys.join(" and ")),
            count_value(pre_filter),
            count_value(post_filter),
        ]],
    )))
}

/// Decompose the scored pairs in a file.
pub fn waterfall(
    settings: &LinkageSettings,
    records: &std::path::Path,
) -> Result<Vec<WaterfallRecord>, Box<dyn std::error::Error>> {
    let records = loader::load_records(records)?;
    Ok(Waterfall::new(settings).decompose_all(&records)?)
}

fn count_value(n: u64) -> Value {
    i64::try_from(n)
        .map(Value::Integer)
        .unwrap_or(Value::Real(n as f64))
}

fn blocking_output(report: &BlockingReport) -> Output {
    let rows = RowSet::from_rows(
        [
            "rule_index",
            "rule",
            "row_count",
            "cumulative_row_count",
            "start",
            "reduction_ratio",
        ],
        report
            .results
            .iter()
            .map(|r| {
                vec![
                    Value::Integer(r.rule_index as i64),
                    Value::from(r.rule.as_str()),
                    count_value(r.row_count),
                    count_value(r.cumulative_row_count),
                    count_value(r.start),
                    Value::Real(r.reduction_ratio),
                ]
            })
            .collect::<Vec<_>>(),
    );
    Output {
        rows,
        summary: Some(format!(
            "{} comparisons generated out of {} possible (reduction ratio {:.4})",
            report.total_comparisons(),
            report.cartesian,
            report.reduction_ratio()
        )),
    }
}

fn missingness_rows(rows: &[MissingnessRow]) -> RowSet {
    RowSet::from_rows(
        [
            "column_name",
            "non_null_count",
            "null_count",
            "null_proportion",
            "total_record_count",
        ],
        rows.iter()
            .map(|r| {
                vec![
                    Value::from(r.column_name.as_str()),
                    count_value(r.non_null_count),
                    count_value(r.null_count),
                    Value::Real(r.null_proportion),
                    count_value(r.total_record_count),
                ]
            })
            .collect::<Vec<_>>(),
    )
}

fn completeness_rows(rows: &[CompletenessRow]) -> RowSet {
    RowSet::from_rows(
        [
            "source_dataset",
            "column_name",
            "total_null_rows",
            "total_rows_inc_nulls",
            "completeness",
        ],
        rows.iter()
            .map(|r| {
                vec![
                    Value::from(r.source_dataset.as_str()),
                    Value::from(r.column_name.as_str()),
                    count_value(r.total_null_rows),
                    count_value(r.total_rows_inc_nulls),
                    Value::Real(r.completeness),
                ]
            })
            .collect::<Vec<_>>(),
    )
}

fn waterfall_rows(items: &[WaterfallRecord]) -> RowSet {
    RowSet::from_rows(
        [
            "record_number",
            "column_name",
            "label",
            "value_l",
            "value_r",
            "log2_bayes_factor",
            "bayes_factor",
            "bayes_factor_description",
        ],
        items
            .iter()
            .map(|i| {
                vec![
                    Value::Integer(i.record_number as i64),
                    Value::from(i.column_name.as_str()),
                    Value::from(i.label.as_str()),
                    Value::from(i.value_l.as_str()),
                    Value::from(i.value_r.as_str()),
                    Value::Real(i.log2_bayes_factor),
                    Value::Real(i.bayes_factor),
                    Value::from(i.bayes_factor_description.clone()),
                ]
            })
            .collect::<Vec<_>>(),
    )
}
