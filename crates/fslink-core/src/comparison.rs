//! Comparison definitions.
//!
//! Comparisons are opaque data to the engine: a name, the input columns they
//! read, and an ordered set of levels keyed by the discrete code written to
//! the `gamma_<name>` column of a scored pair.

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::probability::format_multiplier;

/// Term-frequency adjustment attached to a comparison level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfAdjustment {
    /// Input column whose value frequencies drive the adjustment.
    pub input_column: String,
    /// Weight applied to the adjustment.
    #[serde(default = "default_tf_weight")]
    pub weight: f64,
}

fn default_tf_weight() -> f64 {
    1.0
}

/// One level of a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonLevel {
    /// Discrete code identifying the level in `gamma_<name>`.
    pub comparison_vector_value: i64,
    /// Human readable label.
    pub label: String,
    /// Predicate that selects the level.
    pub sql_condition: String,
    /// Probability of the level among matches.
    #[serde(default)]
    pub m_probability: Option<f64>,
    /// Probability of the level among non-matches.
    #[serde(default)]
    pub u_probability: Option<f64>,
    /// Null levels carry no evidence.
    #[serde(default)]
    pub is_null_level: bool,
    /// Optional term-frequency adjustment.
    #[serde(default)]
    pub tf_adjustment: Option<TfAdjustment>,
}

impl ComparisonLevel {
    /// Ratio m/u.
    ///
    /// Null levels and levels without estimated parameters are neutral (1.0).
    /// A zero `u` gives `+inf`.
    pub fn bayes_factor(&self) -> f64 {
        if self.is_null_level {
            return 1.0;
        }
        match (self.m_probability, self.u_probability) {
            (Some(_), Some(u)) if u == 0.0 => f64::INFINITY,
            (Some(m), Some(u)) => m / u,
            _ => 1.0,
        }
    }

    /// Match weight contributed by the level.
    pub fn log2_bayes_factor(&self) -> f64 {
        self.bayes_factor().log2()
    }

    /// Whether the level has a term-frequency adjustment.
    pub fn has_tf_adjustment(&self) -> bool {
        self.tf_adjustment.is_some()
    }

    /// Sentence describing the level's evidence.
    pub fn bayes_factor_description(&self) -> String {
        let text = format!(
            "If comparison level is `{}` then comparison is",
            self.label.to_lowercase()
        );
        let bf = self.bayes_factor();
        if bf.is_infinite() {
            format!("{} certain to be a match", text)
        } else if bf == 0.0 {
            format!("{} impossible to be a match", text)
        } else if bf >= 1.0 {
            format!(
                "{} {} times more likely to be a match",
                text,
                format_multiplier(bf)
            )
        } else {
            format!(
                "{} {} times less likely to be a match",
                text,
                format_multiplier(1.0 / bf)
            )
        }
    }
}

/// A comparison between the left and right records of a pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    /// Name of the comparison, used to derive column names.
    pub output_column_name: String,
    /// Optional free text description.
    #[serde(default)]
    pub comparison_description: Option<String>,
    /// Input columns read by the level predicates.
    pub input_columns: Vec<String>,
    /// Levels, in evaluation order.
    pub levels: Vec<ComparisonLevel>,
}

impl Comparison {
    /// Column holding the level code of a scored pair.
    pub fn gamma_column_name(&self) -> String {
        format!("gamma_{}", self.output_column_name)
    }

    /// Column holding the term-frequency bayes factor of a scored pair.
    pub fn bf_tf_adj_column_name(&self) -> String {
        format!("bf_tf_adj_{}", self.output_column_name)
    }

    /// Level with the given code.
    pub fn level_by_vector_value(&self, value: i64) -> Option<&ComparisonLevel> {
        self.levels
            .iter()
            .find(|level| level.comparison_vector_value == value)
    }

    /// Check the comparison is well formed.
    pub fn validate(&self) -> Result<(), Error> {
        if self.output_column_name.is_empty() {
            return Err(Error::config("comparison has an empty output_column_name"));
        }
        if self.levels.is_empty() {
            return Err(Error::config(format!(
                "comparison `{}` has no levels",
                self.output_column_name
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for level in &self.levels {
            if !seen.insert(level.comparison_vector_value) {
                return Err(Error::config(format!(
                    "comparison `{}` has duplicate level code {}",
                    self.output_column_name, level.comparison_vector_value
                )));
            }
            for (name, p) in [("m", level.m_probability), ("u", level.u_probability)] {
                if let Some(p) = p {
                    if !(0.0..=1.0).contains(&p) {
                        return Err(Error::config(format!(
                            "comparison `{}` level `{}` has {} probability {} outside [0, 1]",
                            self.output_column_name, level.label, name, p
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
