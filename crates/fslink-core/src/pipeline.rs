//! Query pipelines.
//!
//! A pipeline is an ordered list of named steps. Later steps refer to
//! earlier ones by their output role, exactly like tables. The engine runs a
//! compiled pipeline either as one statement of nested CTEs or as one
//! materialised table per step.
//!
//! ```text
//! enqueue(sql_1, "a")  ─┐
//! enqueue(sql_2, "b")  ─┼─► compile() ─► composed:  WITH a AS (sql_1), b AS (sql_2) SELECT * FROM b
//! inputs: [df -> t_1]  ─┘                traced:    [df := t_1] [a := sql_1] [b := sql_2]
//! ```

use crate::dialect::is_plain_identifier;
use crate::error::Error;
use crate::handle::ResultHandle;

/// One named step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryStep {
    /// Statement text.
    pub sql: String,
    /// Name later steps use to refer to this step's output.
    pub output_role: String,
}

impl QueryStep {
    /// Create a step.
    pub fn new(sql: impl Into<String>, output_role: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            output_role: output_role.into(),
        }
    }
}

/// Builder of an ordered sequence of query steps.
///
/// Construct one per logical operation and hand it to the engine by value.
/// A pipeline that has been compiled rejects new steps until [`reset`] is
/// called.
///
/// [`reset`]: QueryPipeline::reset
#[derive(Debug, Clone, Default)]
pub struct QueryPipeline {
    inputs: Vec<ResultHandle>,
    steps: Vec<QueryStep>,
    compiled: bool,
}

impl QueryPipeline {
    /// Create an empty pipeline with no inputs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pipeline seeded with already-materialised inputs.
    ///
    /// Each input is visible to the steps under its templated name.
    pub fn with_inputs(inputs: impl IntoIterator<Item = ResultHandle>) -> Self {
        Self {
            inputs: inputs.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Add a seed input.
    pub fn add_input(&mut self, input: ResultHandle) {
        self.inputs.push(input);
    }

    /// Append a step.
    pub fn enqueue(
        &mut self,
        sql: impl Into<String>,
        output_role: impl Into<String>,
    ) -> Result<(), Error> {
        if self.compiled {
            return Err(Error::InvalidPipelineState(
                "cannot enqueue into a compiled pipeline; call reset() first".to_string(),
            ));
        }

        let output_role = output_role.into();
        if !is_plain_identifier(&output_role) {
            return Err(Error::InvalidPipelineState(format!(
                "`{}` is not a valid output role",
                output_role
            )));
        }

        self.steps.push(QueryStep::new(sql, output_role));
        Ok(())
    }

    /// Append several steps in order.
    pub fn enqueue_all(&mut self, steps: impl IntoIterator<Item = QueryStep>) -> Result<(), Error> {
        for step in steps {
            self.enqueue(step.sql, step.output_role)?;
        }
        Ok(())
    }

    /// Enqueued steps.
    pub fn steps(&self) -> &[QueryStep] {
        &self.steps
    }

    /// Seed inputs.
    pub fn inputs(&self) -> &[ResultHandle] {
        &self.inputs
    }

    /// Role of the final step.
    pub fn output_role(&self) -> Option<&str> {
        self.steps.last().map(|s| s.output_role.as_str())
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Check if no steps are enqueued.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Whether the pipeline has been compiled and not yet reset.
    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    /// Clear steps and inputs and allow enqueueing again.
    pub fn reset(&mut self) {
        self.steps.clear();
        self.inputs.clear();
        self.compiled = false;
    }

    /// Compile the pipeline and mark it as compiled.
    pub fn compile(&mut self) -> Result<CompiledPipeline, Error> {
        if self.compiled {
            return Err(Error::InvalidPipelineState(
                "pipeline was already compiled; call reset() before reuse".to_string(),
            ));
        }
        let last = self.steps.last().ok_or_else(|| {
            Error::InvalidPipelineState("cannot compile a pipeline with no steps".to_string())
        })?;
        let output_role = last.output_role.clone();

        let seeds: Vec<QueryStep> = self
            .inputs
            .iter()
            .filter(|input| input.is_aliased())
            .map(|input| {
                QueryStep::new(
                    format!("select * from {}", input.physical_name),
                    input.templated_name.clone(),
                )
            })
            .collect();

        let ctes: Vec<String> = seeds
            .iter()
            .chain(self.steps.iter())
            .map(|step| format!("{} as (\n{}\n)", step.output_role, step.sql.trim()))
            .collect();
        let composed = format!(
            "with\n{}\nselect * from {}",
            ctes.join(",\n"),
            output_role
        );

        let mut parts = seeds;
        parts.extend(self.steps.iter().cloned());

        self.compiled = true;
        Ok(CompiledPipeline {
            composed,
            parts,
            output_role,
        })
    }
}

/// A pipeline ready for execution in either mode.
#[derive(Debug, Clone)]
pub struct CompiledPipeline {
    composed: String,
    parts: Vec<QueryStep>,
    output_role: String,
}

impl CompiledPipeline {
    /// Single statement with every step nested as a CTE.
    pub fn composed_sql(&self) -> &str {
        &self.composed
    }

    /// Steps to materialise one by one, seeds first.
    pub fn parts(&self) -> &[QueryStep] {
        &self.parts
    }

    /// Role of the final output.
    pub fn output_role(&self) -> &str {
        &self.output_role
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_and_compile() {
        let mut pipeline = QueryPipeline::new();
        pipeline.enqueue("select 1 as x", "a").unwrap();
        pipeline.enqueue("select x + 1 as x from a", "b").unwrap();

        assert_eq!(pipeline.len(), 2);
        assert_eq!(pipeline.output_role(), Some("b"));

        let compiled = pipeline.compile().unwrap();
        assert_eq!(compiled.output_role(), "b");
        assert_eq!(
            compiled.composed_sql(),
            "with\na as (\nselect 1 as x\n),\nb as (\nselect x + 1 as x from a\n)\nselect * from b"
        );
        assert_eq!(compiled.parts().len(), 2);
    }

    #[test]
    fn test_enqueue_after_compile_fails() {
        let mut pipeline = QueryPipeline::new();
        pipeline.enqueue("select 1", "a").unwrap();
        pipeline.compile().unwrap();

        let err = pipeline.enqueue("select 2", "b").unwrap_err();
        assert!(matches!(err, Error::InvalidPipelineState(_)));

        let err = pipeline.compile().unwrap_err();
        assert!(matches!(err, Error::InvalidPipelineState(_)));
    }

    #[test]
    fn test_reset_allows_reuse() {
        let mut pipeline = QueryPipeline::new();
        pipeline.enqueue("select 1", "a").unwrap();
        pipeline.compile().unwrap();
        pipeline.reset();

        assert!(pipeline.is_empty());
        assert!(!pipeline.is_compiled());
        pipeline.enqueue("select 2", "b").unwrap();
        assert_eq!(pipeline.output_role(), Some("b"));
    }

    #[test]
    fn test_empty_pipeline_does_not_compile() {
        let mut pipeline = QueryPipeline::new();
        assert!(matches!(
            pipeline.compile(),
            Err(Error::InvalidPipelineState(_))
        ));
        assert!(!pipeline.is_compiled());
    }

    #[test]
    fn test_invalid_role_rejected() {
        let mut pipeline = QueryPipeline::new();
        assert!(pipeline.enqueue("select 1", "bad role").is_err());
        assert!(pipeline.enqueue("select 1", "").is_err());
    }

    #[test]
    fn test_aliased_inputs_become_seed_steps() {
        let aliased = ResultHandle::created("df", "df_abc123", "select 1", "s");
        let registered = ResultHandle::existing("people", "people", "s");

        let mut pipeline = QueryPipeline::with_inputs(vec![aliased, registered]);
        pipeline.enqueue("select * from df", "out").unwrap();
        let compiled = pipeline.compile().unwrap();

        // Only the aliased input needs a seed; `people` is already named `people`
        assert_eq!(compiled.parts().len(), 2);
        assert_eq!(compiled.parts()[0].output_role, "df");
        assert_eq!(compiled.parts()[0].sql, "select * from df_abc123");
        assert!(compiled
            .composed_sql()
            .starts_with("with\ndf as (\nselect * from df_abc123\n),"));
    }

    #[test]
    fn test_enqueue_all() {
        let mut pipeline = QueryPipeline::new();
        pipeline
            .enqueue_all(vec![QueryStep::new("select 1", "a"), QueryStep::new("select 2", "b")])
            .unwrap();
        assert_eq!(pipeline.steps()[0].output_role, "a");
        assert_eq!(pipeline.steps()[1].sql, "select 2");
    }
}
