//! Cartesian product sizes and reduction ratios.

use crate::error::Error;
use crate::settings::LinkType;

/// Number of distinct unordered pairs an unfiltered comparison would make.
///
/// `counts` holds the record count of each dataset.
pub fn calculate_cartesian(counts: &[u64], link_type: LinkType) -> Result<u64, Error> {
    let total: u128 = counts.iter().map(|&n| n as u128).sum();

    let pairs = match link_type {
        LinkType::DedupeOnly => {
            if counts.len() != 1 {
                return Err(Error::config(format!(
                    "dedupe_only expects exactly one dataset, got {}",
                    counts.len()
                )));
            }
            if total < 2 {
                return Err(Error::config(format!(
                    "dedupe_only needs at least two records, got {}",
                    total
                )));
            }
            total * (total - 1) / 2
        }
        LinkType::LinkOnly => {
            if counts.len() < 2 {
                return Err(Error::config(format!(
                    "link_only needs at least two datasets, got {}",
                    counts.len()
                )));
            }
            let squares: u128 = counts.iter().map(|&n| (n as u128) * (n as u128)).sum();
            (total * total - squares) / 2
        }
        LinkType::LinkAndDedupe => {
            if total < 2 {
                return Err(Error::config(format!(
                    "link_and_dedupe needs at least two records in total, got {}",
                    total
                )));
            }
            total * (total - 1) / 2
        }
    };

    u64::try_from(pairs)
        .map_err(|_| Error::invalid_data(format!("cartesian product {} overflows u64", pairs)))
}

/// `1 - comparisons / cartesian`.
///
/// An empty cartesian product has ratio 0 when no comparisons are made and
/// `-inf` otherwise.
pub fn reduction_ratio(comparisons: u64, cartesian: u64) -> f64 {
    if cartesian == 0 {
        return if comparisons == 0 { 0.0 } else { f64::NEG_INFINITY };
    }
    1.0 - comparisons as f64 / cartesian as f64
}
