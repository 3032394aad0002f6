//! Linkage settings.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::comparison::Comparison;
use crate::dialect::is_plain_identifier;
use crate::error::Error;

/// Which pairs of records are candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    /// Pairs within a single dataset.
    DedupeOnly,
    /// Pairs across datasets only.
    LinkOnly,
    /// Pairs within and across datasets.
    LinkAndDedupe,
}

impl LinkType {
    /// Settings name of the link type.
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkType::DedupeOnly => "dedupe_only",
            LinkType::LinkOnly => "link_only",
            LinkType::LinkAndDedupe => "link_and_dedupe",
        }
    }
}

impl std::fmt::Display for LinkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_unique_id() -> String {
    "unique_id".to_string()
}

fn default_source_dataset() -> String {
    "source_dataset".to_string()
}

fn default_prior() -> f64 {
    0.0001
}

/// Settings of a linkage model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkageSettings {
    /// Link type.
    pub link_type: LinkType,
    /// Column identifying a record within its dataset.
    #[serde(default = "default_unique_id")]
    pub unique_id_column_name: String,
    /// Column identifying the dataset a record came from.
    #[serde(default = "default_source_dataset")]
    pub source_dataset_column_name: String,
    /// Prior probability that two random records match.
    #[serde(default = "default_prior")]
    pub probability_two_random_records_match: f64,
    /// Blocking rules, in priority order.
    #[serde(default)]
    pub blocking_rules_to_generate_predictions: Vec<String>,
    /// Comparisons, in scoring order.
    #[serde(default)]
    pub comparisons: Vec<Comparison>,
}

impl LinkageSettings {
    /// Minimal settings for a link type, with defaults everywhere else.
    pub fn new(link_type: LinkType) -> Self {
        Self {
            link_type,
            unique_id_column_name: default_unique_id(),
            source_dataset_column_name: default_source_dataset(),
            probability_two_random_records_match: default_prior(),
            blocking_rules_to_generate_predictions: Vec::new(),
            comparisons: Vec::new(),
        }
    }

    /// Set the blocking rules.
    pub fn with_blocking_rules<I, S>(mut self, rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blocking_rules_to_generate_predictions = rules.into_iter().map(Into::into).collect();
        self
    }

    /// Set the comparisons.
    pub fn with_comparisons(mut self, comparisons: Vec<Comparison>) -> Self {
        self.comparisons = comparisons;
        self
    }

    /// Set the prior match probability.
    pub fn with_prior(mut self, probability: f64) -> Self {
        self.probability_two_random_records_match = probability;
        self
    }

    /// Parse and validate settings from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read, parse and validate a JSON settings file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading settings");
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Check the settings are usable.
    pub fn validate(&self) -> Result<(), Error> {
        let p = self.probability_two_random_records_match;
        if !(p > 0.0 && p <= 1.0) {
            return Err(Error::config(format!(
                "probability_two_random_records_match must be in (0, 1], got {}",
                p
            )));
        }
        for (field, name) in [
            ("unique_id_column_name", &self.unique_id_column_name),
            ("source_dataset_column_name", &self.source_dataset_column_name),
        ] {
            if !is_plain_identifier(name) {
                return Err(Error::config(format!("{} `{}` is not a valid column name", field, name)));
            }
        }
        if let Some(rule) = self
            .blocking_rules_to_generate_predictions
            .iter()
            .find(|r| r.trim().is_empty())
        {
            return Err(Error::config(format!("blocking rule `{}` is empty", rule)));
        }

        let mut names = std::collections::HashSet::new();
        for comparison in &self.comparisons {
            comparison.validate()?;
            if !names.insert(comparison.output_column_name.as_str()) {
                return Err(Error::config(format!(
                    "duplicate comparison `{}`",
                    comparison.output_column_name
                )));
            }
        }
        Ok(())
    }
}
