//! Blocking cost analysis.

use serde::Serialize;
use tracing::{debug, info};

use crate::blocking::cartesian::{calculate_cartesian, reduction_ratio};
use crate::blocking::rule::BlockingRule;
use crate::blocking::sql;
use crate::error::Error;
use crate::pipeline::QueryPipeline;
use crate::session::LinkageSession;
use crate::value::RowSet;

/// Comparisons generated by one rule, after the rules before it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CumulativeBlockingResult {
    /// Position of the rule.
    pub rule_index: usize,
    /// Rule predicate.
    pub rule: String,
    /// Pairs first generated by this rule.
    pub row_count: u64,
    /// Pairs generated by this rule and every rule before it.
    pub cumulative_row_count: u64,
    /// `cumulative_row_count - row_count`.
    pub start: u64,
    /// Size of the unfiltered comparison space.
    pub cartesian: u64,
    /// `1 - cumulative_row_count / cartesian`.
    pub reduction_ratio: f64,
}

/// Cumulative blocking results for a rule set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockingReport {
    /// Size of the unfiltered comparison space.
    pub cartesian: u64,
    /// One result per rule, in rule order.
    pub results: Vec<CumulativeBlockingResult>,
}

impl BlockingReport {
    /// Pairs generated by the whole rule set.
    pub fn total_comparisons(&self) -> u64 {
        self.results.last().map_or(0, |r| r.cumulative_row_count)
    }

    /// Reduction ratio of the whole rule set.
    pub fn reduction_ratio(&self) -> f64 {
        reduction_ratio(self.total_comparisons(), self.cartesian)
    }
}

/// Options for pre-filter estimates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreFilterOptions {
    /// Estimate rules without equi-join keys as `count(left) * count(right)`
    /// instead of failing.
    pub allow_cartesian_fallback: bool,
}

impl Default for PreFilterOptions {
    fn default() -> Self {
        Self {
            allow_cartesian_fallback: true,
        }
    }
}

/// Runs blocking analyses for a session.
pub struct BlockingAnalyzer<'s, 'e> {
    session: &'s LinkageSession<'e>,
}

impl<'s, 'e> BlockingAnalyzer<'s, 'e> {
    /// Create an analyzer.
    pub fn new(session: &'s LinkageSession<'e>) -> Self {
        Self { session }
    }

    /// Parse rule texts in the engine's dialect.
    pub fn parse_rules<I, S>(&self, rules: I) -> Vec<BlockingRule>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let dialect = self.session.engine().dialect();
        rules
            .into_iter()
            .map(|rule| BlockingRule::new(rule, dialect))
            .collect()
    }

    /// Rules configured in the settings.
    pub fn rules_from_settings(&self) -> Vec<BlockingRule> {
        self.parse_rules(
            self.session
                .settings()
                .blocking_rules_to_generate_predictions
                .iter()
                .cloned(),
        )
    }

    /// Record count of each dataset.
    pub fn dataset_counts(&self) -> Result<Vec<u64>, Error> {
        let rows = self.run_steps(
            vec![(sql::dataset_counts_sql(self.session), "cartesian_product")],
            true,
        )?;
        rows.column("count")?
            .into_iter()
            .map(|v| {
                v.as_i64()
                    .and_then(|n| u64::try_from(n).ok())
                    .ok_or_else(|| Error::invalid_data(format!("invalid record count {}", v)))
            })
            .collect()
    }

    /// Size of the unfiltered comparison space.
    pub fn cartesian(&self) -> Result<u64, Error> {
        let counts = self.dataset_counts()?;
        calculate_cartesian(&counts, self.session.link_type())
    }

    /// Pairs first generated by each rule, in rule order.
    ///
    /// A pair matched by several rules is counted under the earliest one.
    /// Rules generating no new pairs get an explicit zero.
    pub fn count_per_rule(&self, rules: &[BlockingRule]) -> Result<Vec<u64>, Error> {
        let mut counts = vec![0u64; rules.len()];
        if rules.is_empty() {
            return Ok(counts);
        }

        let blocked_role = self.session.engine().config().role("df_blocked_data");
        let rows = self.run_steps(
            vec![
                (sql::block_using_rules_sql(self.session, rules), "df_blocked_data"),
                (
                    sql::count_by_match_key_sql(&blocked_role),
                    "df_count_cumulative_blocks",
                ),
            ],
            self.pairs_read_concat(),
        )?;

        let row_counts = rows.column("row_count")?;
        let keys = rows.column("match_key")?;
        for (count, key) in row_counts.into_iter().zip(keys) {
            let index = key
                .as_i64()
                .and_then(|k| usize::try_from(k).ok())
                .filter(|&k| k < rules.len())
                .ok_or_else(|| Error::invalid_data(format!("unexpected match_key {}", key)))?;
            counts[index] = count
                .as_i64()
                .and_then(|n| u64::try_from(n).ok())
                .ok_or_else(|| Error::invalid_data(format!("invalid row count {}", count)))?;
        }
        Ok(counts)
    }

    /// Cumulative comparisons generated by a rule set.
    pub fn cumulative_comparisons(&self, rules: &[BlockingRule]) -> Result<BlockingReport, Error> {
        let cartesian = self.cartesian()?;
        let counts = self.count_per_rule(rules)?;

        let mut cumulative = 0u64;
        let results = rules
            .iter()
            .zip(counts)
            .enumerate()
            .map(|(rule_index, (rule, row_count))| {
                cumulative += row_count;
                CumulativeBlockingResult {
                    rule_index,
                    rule: rule.predicate().to_string(),
                    row_count,
                    cumulative_row_count: cumulative,
                    start: cumulative - row_count,
                    cartesian,
                    reduction_ratio: reduction_ratio(cumulative, cartesian),
                }
            })
            .collect::<Vec<_>>();

        info!(
            rules = rules.len(),
            cartesian,
            comparisons = cumulative,
            "computed cumulative blocking counts"
        );
        Ok(BlockingReport { cartesian, results })
    }

    /// Cumulative comparisons generated by the configured rules.
    pub fn cumulative_comparisons_from_settings(&self) -> Result<BlockingReport, Error> {
        self.cumulative_comparisons(&self.rules_from_settings())
    }

    /// Estimate a rule's comparisons from join key frequencies, before the
    /// link-type filter.
    ///
    /// Cheap on large inputs since only grouped key counts are joined.
    pub fn estimate_pre_filter(&self, rule: &BlockingRule, options: PreFilterOptions) -> Result<u64, Error> {
        let steps = match sql::pre_filter_steps(self.session, rule) {
            Some(steps) => steps,
            None if options.allow_cartesian_fallback => {
                debug!(rule = %rule, "no equi-join keys; estimating as cartesian product");
                vec![sql::cartesian_fallback_step(self.session)]
            }
            None => {
                return Err(Error::UnsupportedRule {
                    rule: rule.predicate().to_string(),
                    reason: "no equi-join conditions to estimate from".to_string(),
                })
            }
        };

        let mut pipeline = self.pipeline(self.pairs_read_concat())?;
        pipeline.enqueue_all(steps)?;
        self.session.engine().collect_pipeline(pipeline)?.scalar_u64()
    }

    /// Exact count of a rule's comparisons after the link-type filter.
    pub fn count_post_filter(&self, rule: &BlockingRule) -> Result<u64, Error> {
        self.run_steps(
            vec![(sql::post_filter_sql(self.session, rule), "count_post_filter")],
            self.pairs_read_concat(),
        )?
        .scalar_u64()
    }

    /// Whether pair-generating SQL reads the concatenated table. Two-dataset
    /// `link_only` joins the raw inputs instead.
    fn pairs_read_concat(&self) -> bool {
        !self.session.is_two_dataset_link_only()
    }

    /// Pipeline seeded with the raw inputs, plus the concatenated table
    /// when `with_concat` is set.
    fn pipeline(&self, with_concat: bool) -> Result<QueryPipeline, Error> {
        let mut pipeline = self.session.input_pipeline();
        if with_concat {
            pipeline.add_input(self.session.concat()?);
        }
        Ok(pipeline)
    }

    fn run_steps(&self, steps: Vec<(String, &str)>, with_concat: bool) -> Result<RowSet, Error> {
        let config = self.session.engine().config();
        let mut pipeline = self.pipeline(with_concat)?;
        for (sql, role) in steps {
            pipeline.enqueue(sql, config.role(role))?;
        }
        self.session.engine().collect_pipeline(pipeline)
    }
}
