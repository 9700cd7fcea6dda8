//! Filter, partition and order tabular records by a categorical key.
//!
//! A [`Grouping`] describes one dataset: which records survive, which key a
//! record belongs to, what a record looks like once the key is stripped, and
//! which field orders the output. [`group`] runs the pipeline in one pass
//! over the input followed by a stable sort of every group.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Output of the pipeline: one ascending sequence per group key.
pub type Grouped<O> = BTreeMap<String, Vec<O>>;

/// Which keys appear in the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyDomain {
    /// A group exists for every distinct key observed after filtering.
    Dynamic,
    /// Exactly these groups exist, empty or not. Records whose key is not in
    /// the list are not retained.
    Fixed(Vec<String>),
}

impl KeyDomain {
    fn admits(&self, key: &str) -> bool {
        match self {
            KeyDomain::Dynamic => true,
            KeyDomain::Fixed(keys) => keys.iter().any(|k| k == key),
        }
    }
}

/// Per-dataset rules for [`group`].
pub trait Grouping {
    type Record;
    type Output;
    type Time: Ord;

    /// Inclusion predicate.
    fn include(&self, record: &Self::Record) -> bool;

    fn key<'r>(&self, record: &'r Self::Record) -> &'r str;

    /// Projects a record to its output form, dropping the grouping field.
    fn project(&self, record: &Self::Record) -> Self::Output;

    /// Sort key within a group.
    fn time(&self, output: &Self::Output) -> Self::Time;

    fn domain(&self) -> KeyDomain;
}

/// Counters describing one run of the pipeline.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct GroupStats {
    pub input: usize,
    pub retained: usize,
    /// Rejected by the inclusion predicate.
    pub excluded: usize,
    /// Passed the predicate but keyed outside a fixed domain.
    pub outside_domain: usize,
    pub groups: usize,
}

/// Groups `records` according to `rules`.
///
/// Each group is sorted ascending by [`Grouping::time`]; records with equal
/// time values keep their input order.
pub fn group<G: Grouping>(records: &[G::Record], rules: &G) -> Grouped<G::Output> {
    group_with_stats(records, rules).0
}

/// Same as [`group`], also returning counters for logging.
pub fn group_with_stats<G: Grouping>(
    records: &[G::Record],
    rules: &G,
) -> (Grouped<G::Output>, GroupStats) {
    let domain = rules.domain();
    let mut grouped: Grouped<G::Output> = BTreeMap::new();
    let mut stats = GroupStats {
        input: records.len(),
        ..GroupStats::default()
    };

    if let KeyDomain::Fixed(keys) = &domain {
        for key in keys {
            grouped.entry(key.clone()).or_default();
        }
    }

    for record in records {
        if !rules.include(record) {
            stats.excluded += 1;
            continue;
        }

        let key = rules.key(record);
        if !domain.admits(key) {
            stats.outside_domain += 1;
            continue;
        }

        stats.retained += 1;
        grouped
            .entry(key.to_string())
            .or_default()
            .push(rules.project(record));
    }

    // sort_by_key is stable
    for series in grouped.values_mut() {
        series.sort_by_key(|o| rules.time(o));
    }

    stats.groups = grouped.len();
    debug!(
        input = stats.input,
        retained = stats.retained,
        excluded = stats.excluded,
        outside_domain = stats.outside_domain,
        groups = stats.groups,
        "Grouped records"
    );

    (grouped, stats)
}
