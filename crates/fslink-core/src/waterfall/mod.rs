//! Score decomposition.
//!
//! Explains a scored pair's match weight as an ordered sequence of evidence
//! items: the prior, one item per comparison (plus one more when the
//! selected level carries a term-frequency adjustment) and the final score.
//! Every item except the final score adds to the final match weight.
//!
//! This module is pure computation over records already read from the
//! backend.

mod record;

pub use record::WaterfallRecord;

use crate::comparison::Comparison;
use crate::error::Error;
use crate::probability::{format_multiplier, match_weight_to_bayes_factor, prob_to_bayes_factor};
use crate::settings::LinkageSettings;
use crate::value::{Record, Value};

/// `column_name` of the prior item.
pub const PRIOR_COLUMN: &str = "Prior";
/// `column_name` of the final score item.
pub const FINAL_SCORE_COLUMN: &str = "Final score";
/// Column of a scored pair holding its total match weight.
pub const MATCH_WEIGHT_COLUMN: &str = "match_weight";

/// Decomposes scored pairs for one set of settings.
pub struct Waterfall<'a> {
    prior: f64,
    comparisons: &'a [Comparison],
}

impl<'a> Waterfall<'a> {
    /// Create a decomposer from linkage settings.
    pub fn new(settings: &'a LinkageSettings) -> Self {
        Self::with_comparisons(settings.probability_two_random_records_match, &settings.comparisons)
    }

    /// Create a decomposer from a prior and comparisons.
    pub fn with_comparisons(prior: f64, comparisons: &'a [Comparison]) -> Self {
        Self { prior, comparisons }
    }

    /// Break down one scored pair.
    pub fn decompose(&self, record: &Record) -> Result<Vec<WaterfallRecord>, Error> {
        let mut items = vec![self.prior_item()];
        for comparison in self.comparisons {
            self.comparison_items(record, comparison, &mut items)?;
        }
        items.push(final_score_item(record)?);

        for (i, item) in items.iter_mut().enumerate() {
            item.sort_order = i;
        }
        Ok(items)
    }

    /// Break down several scored pairs, numbering them in order.
    pub fn decompose_all(&self, records: &[Record]) -> Result<Vec<WaterfallRecord>, Error> {
        let mut out = Vec::new();
        for (record_number, record) in records.iter().enumerate() {
            let mut items = self.decompose(record)?;
            for item in &mut items {
                item.record_number = record_number;
            }
            out.extend(items);
        }
        Ok(out)
    }

    fn prior_item(&self) -> WaterfallRecord {
        let bayes_factor = prob_to_bayes_factor(self.prior);
        WaterfallRecord::summary(
            PRIOR_COLUMN,
            "Starting match weight (prior)",
            bayes_factor.log2(),
            bayes_factor,
        )
    }

    fn comparison_items(
        &self,
        record: &Record,
        comparison: &Comparison,
        out: &mut Vec<WaterfallRecord>,
    ) -> Result<(), Error> {
        let gamma_column = comparison.gamma_column_name();
        let code = field(record, &gamma_column)?
            .as_i64()
            .ok_or_else(|| Error::invalid_data(format!("`{}` is not an integer level code", gamma_column)))?;
        let level = comparison.level_by_vector_value(code).ok_or_else(|| {
            Error::invalid_data(format!(
                "comparison `{}` has no level with code {}",
                comparison.output_column_name, code
            ))
        })?;

        let item = WaterfallRecord {
            column_name: comparison.output_column_name.clone(),
            label: level.label.clone(),
            sql_condition: Some(level.sql_condition.clone()),
            log2_bayes_factor: level.log2_bayes_factor(),
            bayes_factor: level.bayes_factor(),
            comparison_vector_value: Some(code),
            m_probability: level.m_probability,
            u_probability: level.u_probability,
            bayes_factor_description: Some(level.bayes_factor_description()),
            value_l: joined_values(record, comparison, "_l")?,
            value_r: joined_values(record, comparison, "_r")?,
            term_frequency_adjustment: Some(false),
            sort_order: 0,
            record_number: 0,
        };

        let tf_item = match &level.tf_adjustment {
            Some(tf) => {
                let bf_column = comparison.bf_tf_adj_column_name();
                let bayes_factor = field(record, &bf_column)?
                    .as_f64()
                    .ok_or_else(|| Error::invalid_data(format!("`{}` is not numeric", bf_column)))?;

                let description = if bayes_factor >= 1.0 {
                    format!(
                        "Term frequency adjustment on {} makes comparison {} times more likely to be a match",
                        tf.input_column,
                        format_multiplier(bayes_factor)
                    )
                } else {
                    format!(
                        "Term frequency adjustment on {} makes comparison {} times less likely to be a match",
                        tf.input_column,
                        format_multiplier(1.0 / bayes_factor)
                    )
                };

                Some(WaterfallRecord {
                    column_name: format!("tf_{}", comparison.output_column_name),
                    label: format!(
                        "Term freq adjustment on {} with weight {}",
                        tf.input_column, tf.weight
                    ),
                    log2_bayes_factor: bayes_factor.log2(),
                    bayes_factor,
                    m_probability: None,
                    u_probability: None,
                    bayes_factor_description: Some(description),
                    term_frequency_adjustment: Some(true),
                    ..item.clone()
                })
            }
            None => None,
        };

        out.push(item);
        out.extend(tf_item);
        Ok(())
    }
}

fn final_score_item(record: &Record) -> Result<WaterfallRecord, Error> {
    let match_weight = field(record, MATCH_WEIGHT_COLUMN)?
        .as_f64()
        .ok_or_else(|| Error::invalid_data(format!("`{}` is not numeric", MATCH_WEIGHT_COLUMN)))?;
    Ok(WaterfallRecord::summary(
        FINAL_SCORE_COLUMN,
        FINAL_SCORE_COLUMN,
        match_weight,
        match_weight_to_bayes_factor(match_weight),
    ))
}

fn field<'r>(record: &'r Record, column: &str) -> Result<&'r Value, Error> {
    record
        .get(column)
        .ok_or_else(|| Error::invalid_data(format!("scored record has no column `{}`", column)))
}

fn joined_values(record: &Record, comparison: &Comparison, suffix: &str) -> Result<String, Error> {
    let values = comparison
        .input_columns
        .iter()
        .map(|column| field(record, &format!("{}{}", column, suffix)).map(ToString::to_string))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(values.join(", "))
}
