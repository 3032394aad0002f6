//! Blocking cost estimation.
//!
//! Blocking rules restrict which record pairs are compared. This module
//! measures how many pairs a rule set generates relative to the full
//! cartesian product:
//!
//! - [`BlockingAnalyzer::cartesian`]: size of the unfiltered comparison space
//! - [`BlockingAnalyzer::cumulative_comparisons`]: exact first-match counts
//!   per rule with running totals and reduction ratios
//! - [`BlockingAnalyzer::estimate_pre_filter`]: cheap estimate from grouped
//!   join key counts
//! - [`BlockingAnalyzer::count_post_filter`]: exact count for one rule

mod analysis;
mod cartesian;
mod rule;
pub mod sql;

pub use analysis::{BlockingAnalyzer, BlockingReport, CumulativeBlockingResult, PreFilterOptions};
pub use cartesian::{calculate_cartesian, reduction_ratio};
pub use rule::BlockingRule;
