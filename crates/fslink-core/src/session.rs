//! Linkage sessions.
//!
//! A session binds an engine, the linkage settings and the registered input
//! tables. Analyses start from the session: it knows how to stack the
//! inputs into one concatenated table and which columns they share.

use std::collections::BTreeSet;

use tracing::debug;

use crate::dialect::is_plain_identifier;
use crate::engine::ExecutionEngine;
use crate::error::Error;
use crate::handle::ResultHandle;
use crate::pipeline::QueryPipeline;
use crate::settings::{LinkType, LinkageSettings};

/// Engine, settings and inputs of one linkage job.
pub struct LinkageSession<'e> {
    engine: &'e ExecutionEngine,
    settings: LinkageSettings,
    inputs: Vec<ResultHandle>,
}

impl<'e> LinkageSession<'e> {
    /// Create a session over already registered inputs.
    pub fn new(
        engine: &'e ExecutionEngine,
        settings: LinkageSettings,
        inputs: Vec<ResultHandle>,
    ) -> Result<Self, Error> {
        settings.validate()?;
        if inputs.is_empty() {
            return Err(Error::config("a linkage session needs at least one input table"));
        }
        debug!(
            link_type = %settings.link_type,
            inputs = inputs.len(),
            "created linkage session"
        );
        Ok(Self {
            engine,
            settings,
            inputs,
        })
    }

    /// The engine.
    pub fn engine(&self) -> &'e ExecutionEngine {
        self.engine
    }

    /// The settings.
    pub fn settings(&self) -> &LinkageSettings {
        &self.settings
    }

    /// Link type.
    pub fn link_type(&self) -> LinkType {
        self.settings.link_type
    }

    /// Registered inputs, in registration order.
    pub fn inputs(&self) -> &[ResultHandle] {
        &self.inputs
    }

    /// Role of the concatenated input table.
    pub fn concat_role(&self) -> String {
        self.engine.config().role("df_concat")
    }

    /// Link-only between exactly two inputs: the raw tables can be joined
    /// directly without a concatenation.
    pub fn is_two_dataset_link_only(&self) -> bool {
        self.settings.link_type == LinkType::LinkOnly && self.inputs.len() == 2
    }

    /// Columns shared by every input, in the order of the first input.
    ///
    /// Inputs must all have the same set of columns.
    pub fn input_columns(&self) -> Result<Vec<String>, Error> {
        let mut iter = self.inputs.iter();
        let first = match iter.next() {
            Some(first) => first,
            None => return Ok(Vec::new()),
        };
        let columns = self.engine.columns(first)?;
        let expected: BTreeSet<&str> = columns.iter().map(String::as_str).collect();

        for input in iter {
            let other = self.engine.columns(input)?;
            let found: BTreeSet<&str> = other.iter().map(String::as_str).collect();
            if found != expected {
                let missing: Vec<&str> = expected.difference(&found).copied().collect();
                let extra: Vec<&str> = found.difference(&expected).copied().collect();
                return Err(Error::config(format!(
                    "input `{}` does not match `{}`: missing [{}], extra [{}]",
                    input.templated_name,
                    first.templated_name,
                    missing.join(", "),
                    extra.join(", ")
                )));
            }
        }
        Ok(columns)
    }

    /// Whether the concatenated table carries a source dataset column.
    ///
    /// A single deduplicated input is used as is; otherwise the column is
    /// added from each input's name unless the inputs already have it.
    pub fn concat_has_source_dataset(&self, columns: &[String]) -> bool {
        let source = &self.settings.source_dataset_column_name;
        columns.iter().any(|c| c == source)
            || self.settings.link_type != LinkType::DedupeOnly
            || self.inputs.len() > 1
    }

    /// Statement stacking every input into one table.
    pub fn concat_sql(&self) -> Result<String, Error> {
        let columns = self.input_columns()?;
        let dialect = self.engine.dialect();
        let source = &self.settings.source_dataset_column_name;

        let add_source = self.concat_has_source_dataset(&columns) && !columns.iter().any(|c| c == source);
        let select_list = columns
            .iter()
            .map(|c| quote_if_needed(c, dialect))
            .collect::<Vec<_>>()
            .join(", ");

        let selects: Vec<String> = self
            .inputs
            .iter()
            .map(|input| {
                if add_source {
                    format!(
                        "select {} as {}, {} from {}",
                        dialect.quote_literal(&input.templated_name),
                        source,
                        select_list,
                        input.templated_name
                    )
                } else {
                    format!("select {} from {}", select_list, input.templated_name)
                }
            })
            .collect();

        Ok(selects.join("\nunion all\n"))
    }

    /// Pipeline seeded with the inputs.
    pub fn input_pipeline(&self) -> QueryPipeline {
        QueryPipeline::with_inputs(self.inputs.iter().cloned())
    }

    /// Materialise the concatenated input table.
    ///
    /// Repeated calls resolve to the same table through the cache.
    pub fn concat(&self) -> Result<ResultHandle, Error> {
        let mut pipeline = self.input_pipeline();
        pipeline.enqueue(self.concat_sql()?, self.concat_role())?;
        self.engine.execute_pipeline(pipeline)
    }
}

/// Quote a column name unless it can be used bare.
pub(crate) fn quote_if_needed(name: &str, dialect: &dyn crate::dialect::SqlDialect) -> String {
    if is_plain_identifier(name) {
        name.to_string()
    } else {
        dialect.quote_identifier(name)
    }
}
