//! Output formatters for analysis results.

use clap::ValueEnum;
use comfy_table::{Cell, Table};
use fslink_core::{RowSet, Value};

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
    /// CSV format
    Csv,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

/// Trait for formatting output.
pub trait Formatter: Send + Sync {
    /// Format a result set.
    fn format_rows(&self, rows: &RowSet) -> String;

    /// Format a one-line summary printed after the rows.
    ///
    /// Returns `None` when the format has no place for it.
    fn format_summary(&self, summary: &str) -> Option<String>;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Csv => Box::new(CsvFormatter),
    }
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_rows(&self, rows: &RowSet) -> String {
        if rows.is_empty() {
            return "No results".to_string();
        }

        let mut table = Table::new();
        table.set_header(rows.columns.iter().map(Cell::new).collect::<Vec<_>>());
        for row in &rows.rows {
            table.add_row(row.iter().map(|v| Cell::new(format_value(v))).collect::<Vec<_>>());
        }

        format!("{}\n{} row(s)", table, rows.len())
    }

    fn format_summary(&self, summary: &str) -> Option<String> {
        Some(summary.to_string())
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format_rows(&self, rows: &RowSet) -> String {
        let array: Vec<serde_json::Value> = rows
            .rows
            .iter()
            .map(|row| {
                let obj: serde_json::Map<String, serde_json::Value> = rows
                    .columns
                    .iter()
                    .zip(row)
                    .map(|(name, value)| (name.clone(), value_to_json(value)))
                    .collect();
                serde_json::Value::Object(obj)
            })
            .collect();
        serde_json::to_string_pretty(&array).unwrap_or_else(|_| "[]".to_string())
    }

    fn format_summary(&self, _summary: &str) -> Option<String> {
        None
    }
}

/// CSV formatter.
pub struct CsvFormatter;

impl Formatter for CsvFormatter {
    fn format_rows(&self, rows: &RowSet) -> String {
        let mut output = rows
            .columns
            .iter()
            .map(|c| format_text_csv(c))
            .collect::<Vec<_>>()
            .join(",");
        output.push('\n');

        for row in &rows.rows {
            let cells: Vec<String> = row.iter().map(format_value_csv).collect();
            output.push_str(&cells.join(","));
            output.push('\n');
        }

        output
    }

    fn format_summary(&self, _summary: &str) -> Option<String> {
        None
    }
}

/// Format a Value as a display string.
fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        other => other.to_string(),
    }
}

/// Format a Value for CSV output.
fn format_value_csv(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Text(s) => format_text_csv(s),
        other => other.to_string(),
    }
}

/// Quote text that would break a CSV row.
fn format_text_csv(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", escape_csv(s))
    } else {
        s.to_string()
    }
}

/// Convert a Value to JSON.
fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Integer(i) => serde_json::Value::Number((*i).into()),
        Value::Real(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Text(s) => serde_json::Value::String(s.clone()),
    }
}

/// Escape a string for CSV.
fn escape_csv(s: &str) -> String {
    s.replace('"', "\"\"")
}
