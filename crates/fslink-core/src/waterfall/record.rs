//! Waterfall records.

use serde::Serialize;

/// One evidence item in the breakdown of a scored pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaterfallRecord {
    /// `Prior`, the comparison name, `tf_<comparison>` or `Final score`.
    pub column_name: String,
    /// Label for display.
    pub label: String,
    /// Predicate of the selected comparison level.
    pub sql_condition: Option<String>,
    /// Match weight of the item.
    pub log2_bayes_factor: f64,
    /// `2^log2_bayes_factor`.
    pub bayes_factor: f64,
    /// Level code the pair was assigned.
    pub comparison_vector_value: Option<i64>,
    /// Level m probability.
    pub m_probability: Option<f64>,
    /// Level u probability.
    pub u_probability: Option<f64>,
    /// Sentence describing the evidence.
    pub bayes_factor_description: Option<String>,
    /// Comma-joined left input values.
    pub value_l: String,
    /// Comma-joined right input values.
    pub value_r: String,
    /// Whether this is a term-frequency item; `None` for prior and final score.
    pub term_frequency_adjustment: Option<bool>,
    /// Emission index within the pair's breakdown.
    pub sort_order: usize,
    /// Index of the pair among the decomposed records.
    pub record_number: usize,
}

impl WaterfallRecord {
    /// An item carrying only a weight, such as the prior or the final score.
    pub(crate) fn summary(column_name: &str, label: &str, log2_bayes_factor: f64, bayes_factor: f64) -> Self {
        Self {
            column_name: column_name.to_string(),
            label: label.to_string(),
            sql_condition: None,
            log2_bayes_factor,
            bayes_factor,
            comparison_vector_value: None,
            m_probability: None,
            u_probability: None,
            bayes_factor_description: None,
            value_l: String::new(),
            value_r: String::new(),
            term_frequency_adjustment: None,
            sort_order: 0,
            record_number: 0,
        }
    }

    /// Whether this is the final score item.
    pub fn is_final_score(&self) -> bool {
        self.column_name == super::FINAL_SCORE_COLUMN
    }
}
