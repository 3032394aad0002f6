//! Missingness and completeness profiles of the input data.

use serde::Serialize;
use tracing::debug;

use crate::error::Error;
use crate::handle::ResultHandle;
use crate::pipeline::QueryPipeline;
use crate::session::{quote_if_needed, LinkageSession};
use crate::value::{Record, Value};

/// Null statistics of one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingnessRow {
    /// Column name.
    pub column_name: String,
    /// Rows where the column is not null.
    pub non_null_count: u64,
    /// Rows where the column is null.
    pub null_count: u64,
    /// `null_count / total_record_count`, zero for an empty table.
    pub null_proportion: f64,
    /// Rows in the table.
    pub total_record_count: u64,
}

/// Completeness of one column within one source dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletenessRow {
    /// Source dataset.
    pub source_dataset: String,
    /// Column name.
    pub column_name: String,
    /// Rows where the column is null.
    pub total_null_rows: u64,
    /// Rows in the dataset, nulls included.
    pub total_rows_inc_nulls: u64,
    /// Fraction of non-null rows.
    pub completeness: f64,
}

/// Computes data profiles for a session.
pub struct Profiler<'s, 'e> {
    session: &'s LinkageSession<'e>,
}

impl<'s, 'e> Profiler<'s, 'e> {
    /// Create a profiler.
    pub fn new(session: &'s LinkageSession<'e>) -> Self {
        Self { session }
    }

    /// Null statistics for every column of `table`, or of the concatenated
    /// inputs when no table is given.
    pub fn missingness(&self, table: Option<&ResultHandle>) -> Result<Vec<MissingnessRow>, Error> {
        let engine = self.session.engine();
        let (table, columns) = match table {
            Some(table) => (table.clone(), engine.columns(table)?),
            None => (self.session.concat()?, self.session.input_columns()?),
        };
        if columns.is_empty() {
            return Ok(Vec::new());
        }

        let dialect = engine.dialect();
        let config = engine.config();
        let source = &table.templated_name;
        let counts_role = config.role("null_counts_for_columns");

        let per_column = columns
            .iter()
            .map(|column| {
                format!(
                    "select count({}) as non_null_count, {} as column_name from {}",
                    quote_if_needed(column, dialect),
                    dialect.quote_literal(column),
                    source
                )
            })
            .collect::<Vec<_>>()
            .join("\nunion all\n");

        let summary = format!(
            "select\n    column_name,\n    non_null_count,\n    \
             (select count(*) from {source}) - non_null_count as null_count,\n    \
             1.0 - non_null_count / (select cast(count(*) as {float}) from {source}) as null_proportion,\n    \
             (select count(*) from {source}) as total_record_count\nfrom {counts_role}",
            float = dialect.float_type(),
        );

        let mut pipeline = QueryPipeline::with_inputs([table.clone()]);
        pipeline.enqueue(per_column, counts_role.clone())?;
        pipeline.enqueue(summary, config.role("missingness_data"))?;
        let rows = engine.collect_pipeline(pipeline)?;

        let mut out = rows
            .records()
            .iter()
            .map(|r| {
                let total = count(r, "total_record_count")?;
                Ok(MissingnessRow {
                    column_name: text(r, "column_name")?,
                    non_null_count: count(r, "non_null_count")?,
                    null_count: count(r, "null_count")?,
                    null_proportion: if total == 0 { 0.0 } else { real(r, "null_proportion")? },
                    total_record_count: total,
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;
        out.sort_by_key(|row| columns.iter().position(|c| *c == row.column_name));
        debug!(table = %table.physical_name, columns = out.len(), "computed missingness");
        Ok(out)
    }

    /// Completeness of each column per source dataset.
    ///
    /// Defaults to the input columns of the comparisons, or every input
    /// column other than the id columns when no comparison is configured.
    pub fn completeness(&self, columns: Option<&[String]>) -> Result<Vec<CompletenessRow>, Error> {
        let engine = self.session.engine();
        let dialect = engine.dialect();
        let settings = self.session.settings();

        let input_columns = self.session.input_columns()?;
        let columns: Vec<String> = match columns {
            Some(columns) => columns.to_vec(),
            None => self.default_profile_columns(&input_columns),
        };
        if columns.is_empty() {
            return Ok(Vec::new());
        }

        let concat = self.session.concat()?;
        let (source_expr, group_by) = if self.session.concat_has_source_dataset(&input_columns) {
            let source = settings.source_dataset_column_name.clone();
            (source.clone(), format!("\ngroup by {}", source))
        } else {
            (dialect.quote_literal(&self.session.inputs()[0].templated_name), String::new())
        };

        let sql = columns
            .iter()
            .map(|column| {
                let quoted = quote_if_needed(column, dialect);
                format!(
                    "select\n    {source_expr} as source_dataset,\n    {name} as column_name,\n    \
                     count(*) - count({quoted}) as total_null_rows,\n    \
                     count(*) as total_rows_inc_nulls,\n    \
                     cast(count({quoted}) * 1.0 / count(*) as {float}) as completeness\n\
                     from {table}{group_by}",
                    name = dialect.quote_literal(column),
                    float = dialect.float_type(),
                    table = concat.templated_name,
                )
            })
            .collect::<Vec<_>>()
            .join("\nunion all\n");

        let mut pipeline = QueryPipeline::with_inputs([concat]);
        pipeline.enqueue(sql, engine.config().role("df_all_column_completeness"))?;
        let rows = engine.collect_pipeline(pipeline)?;

        let mut out = rows
            .records()
            .iter()
            .map(|r| {
                Ok(CompletenessRow {
                    source_dataset: text(r, "source_dataset")?,
                    column_name: text(r, "column_name")?,
                    total_null_rows: count(r, "total_null_rows")?,
                    total_rows_inc_nulls: count(r, "total_rows_inc_nulls")?,
                    completeness: real(r, "completeness")?,
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;
        out.sort_by(|a, b| {
            let pos = |name: &str| columns.iter().position(|c| c == name);
            pos(&a.column_name)
                .cmp(&pos(&b.column_name))
                .then_with(|| a.source_dataset.cmp(&b.source_dataset))
        });
        Ok(out)
    }

    fn default_profile_columns(&self, input_columns: &[String]) -> Vec<String> {
        let settings = self.session.settings();
        let mut columns: Vec<String> = Vec::new();
        for comparison in &settings.comparisons {
            for column in &comparison.input_columns {
                if !columns.contains(column) {
                    columns.push(column.clone());
                }
            }
        }
        if columns.is_empty() {
            columns = input_columns
                .iter()
                .filter(|c| {
                    **c != settings.unique_id_column_name && **c != settings.source_dataset_column_name
                })
                .cloned()
                .collect();
        }
        columns
    }
}

fn get<'r>(record: &'r Record, column: &str) -> Result<&'r Value, Error> {
    record
        .get(column)
        .ok_or_else(|| Error::invalid_data(format!("profile result has no column `{}`", column)))
}

fn count(record: &Record, column: &str) -> Result<u64, Error> {
    let value = get(record, column)?;
    value
        .as_i64()
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| Error::invalid_data(format!("`{}` is not a count: {}", column, value)))
}

fn real(record: &Record, column: &str) -> Result<f64, Error> {
    let value = get(record, column)?;
    value
        .as_f64()
        .ok_or_else(|| Error::invalid_data(format!("`{}` is not numeric: {}", column, value)))
}

fn text(record: &Record, column: &str) -> Result<String, Error> {
    Ok(get(record, column)?.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::SqliteBackend;
    use crate::config::EngineConfig;
    use crate::engine::ExecutionEngine;
    use crate::settings::{LinkType, LinkageSettings};
    use crate::value::RowSet;

    fn engine() -> ExecutionEngine {
        ExecutionEngine::new(Arc::new(SqliteBackend::in_memory().unwrap()), EngineConfig::default())
    }

    fn rows(names: &[Option<&str>]) -> RowSet {
        RowSet::from_rows(
            ["unique_id", "name", "city"],
            names
                .iter()
                .enumerate()
                .map(|(i, name)| vec![Value::Integer(i as i64), Value::from(*name), Value::from("leeds")])
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn test_missingness() {
        let engine = engine();
        let a = engine
            .register_table("a", &rows(&[Some("x"), None, None, Some("y")]), false)
            .unwrap();
        let session =
            LinkageSession::new(&engine, LinkageSettings::new(LinkType::DedupeOnly), vec![a]).unwrap();

        let profile = Profiler::new(&session).missingness(None).unwrap();
        assert_eq!(
            profile.iter().map(|r| r.column_name.as_str()).collect::<Vec<_>>(),
            vec!["unique_id", "name", "city"]
        );
        let name = &profile[1];
        assert_eq!(name.non_null_count, 2);
        assert_eq!(name.null_count, 2);
        assert_eq!(name.total_record_count, 4);
        assert!((name.null_proportion - 0.5).abs() < 1e-12);
        assert_eq!(profile[2].null_proportion, 0.0);
    }

    #[test]
    fn test_completeness_per_dataset() {
        let engine = engine();
        let a = engine.register_table("a", &rows(&[Some("x"), None]), false).unwrap();
        let b = engine
            .register_table("b", &rows(&[Some("x"), Some("y"), Some("z")]), false)
            .unwrap();
        let session =
            LinkageSession::new(&engine, LinkageSettings::new(LinkType::LinkOnly), vec![a, b]).unwrap();

        let profile = Profiler::new(&session)
            .completeness(Some(&["name".to_string()]))
            .unwrap();
        assert_eq!(profile.len(), 2);
        assert_eq!(profile[0].source_dataset, "a");
        assert_eq!(profile[0].total_null_rows, 1);
        assert_eq!(profile[0].total_rows_inc_nulls, 2);
        assert!((profile[0].completeness - 0.5).abs() < 1e-12);
        assert_eq!(profile[1].source_dataset, "b");
        assert_eq!(profile[1].completeness, 1.0);
    }

    #[test]
    fn test_completeness_default_columns() {
        let engine = engine();
        let a = engine.register_table("a", &rows(&[Some("x"), None]), false).unwrap();
        let session =
            LinkageSession::new(&engine, LinkageSettings::new(LinkType::DedupeOnly), vec![a]).unwrap();

        let profile = Profiler::new(&session).completeness(None).unwrap();
        let columns: Vec<&str> = profile.iter().map(|r| r.column_name.as_str()).collect();
        assert_eq!(columns, vec!["name", "city"]);
        assert!(profile.iter().all(|r| r.source_dataset == "a"));
    }
}
