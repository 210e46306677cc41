//! Record Filters
//!
//! Projection of buffer indices onto a subscriber's filter lists. A list
//! whose first element is [`WILDCARD`] selects every key present in the
//! index; an empty list selects nothing.
//!
//! Dual-dimension collections (orders, trades, positions, trigger failures)
//! are filtered on both dimensions and combined by [`RecordId`].

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use crate::domain::buffer::{Index, RecordId, Shared};

/// Filter value matching every key.
pub const WILDCARD: &str = "*";

/// Errors raised while filtering.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    /// Exactly one of the two indices of a dual-dimension collection is
    /// empty.
    #[error("firstMap and secondMap must have the same length")]
    InvalidParameters,
}

/// Whether a filter list is the wildcard.
#[must_use]
pub fn is_wildcard(filter: &[String]) -> bool {
    filter.first().is_some_and(|first| first == WILDCARD)
}

/// Filter a single-dimension index.
///
/// Explicit keys are visited in filter order. The wildcard yields every
/// record ordered by identity.
#[must_use]
pub fn filter_single<T>(index: &Index<T>, filter: &[String]) -> Vec<Shared<T>> {
    if is_wildcard(filter) {
        let mut all: Vec<Shared<T>> = index.values().flatten().map(Arc::clone).collect();
        all.sort_by_key(|record| record.id);
        return all;
    }

    filter
        .iter()
        .filter_map(|key| index.get(key))
        .flatten()
        .map(Arc::clone)
        .collect()
}

fn subset<T>(index: &Index<T>, filter: &[String]) -> BTreeMap<RecordId, Shared<T>> {
    let mut out = BTreeMap::new();
    let mut add = |records: &Vec<Shared<T>>| {
        for record in records {
            out.insert(record.id, Arc::clone(record));
        }
    };

    if is_wildcard(filter) {
        index.values().for_each(&mut add);
    } else {
        filter.iter().filter_map(|key| index.get(key)).for_each(&mut add);
    }
    out
}

/// Filter a dual-dimension collection.
///
/// With both filters set the result is the intersection of the two
/// subsets; with one set it is that subset alone. Output is ordered by
/// identity.
///
/// # Errors
///
/// Returns [`FilterError::InvalidParameters`] when exactly one index is
/// empty.
pub fn filter_multi<T>(
    first_index: &Index<T>,
    second_index: &Index<T>,
    first_filter: &[String],
    second_filter: &[String],
) -> Result<Vec<Shared<T>>, FilterError> {
    let no_filters = first_filter.is_empty() && second_filter.is_empty();
    let no_data = first_index.is_empty() && second_index.is_empty();
    if no_filters || no_data {
        return Ok(Vec::new());
    }
    if first_index.is_empty() || second_index.is_empty() {
        return Err(FilterError::InvalidParameters);
    }

    let first = subset(first_index, first_filter);
    let second = subset(second_index, second_filter);
    if first.is_empty() && second.is_empty() {
        return Ok(Vec::new());
    }

    let out = match (first_filter.is_empty(), second_filter.is_empty()) {
        (false, false) => first
            .into_iter()
            .filter(|(id, _)| second.contains_key(id))
            .map(|(_, record)| record)
            .collect(),
        (false, true) => first.into_values().collect(),
        (true, false) => second.into_values().collect(),
        (true, true) => Vec::new(),
    };
    Ok(out)
}
