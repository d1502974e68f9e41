//! Aggregate rows, ordered results, and push payloads.
//!
//! An aggregate is a grouped count over the records matching one partition
//! key: one row per group label, ordered so the largest groups come first
//! and ties resolve alphabetically. The ordering is part of the contract;
//! clients render rows in the order received.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::session::PartitionKey;

/// One group in an aggregate: a label and how many records carry it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateRow {
    /// Value of the grouping field.
    pub group_label: String,

    /// Number of matching records in the group.
    pub count: u64,
}

impl AggregateRow {
    /// Creates a row.
    pub fn new(group_label: impl Into<String>, count: u64) -> Self {
        Self {
            group_label: group_label.into(),
            count,
        }
    }
}

/// An ordered sequence of aggregate rows.
///
/// Rows are sorted by count descending, ties broken by label ascending.
/// Construction through [`AggregateResult::from_counts`] enforces the
/// ordering; the sequence is never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateResult(Vec<AggregateRow>);

impl AggregateResult {
    /// Builds a result from unordered (label, count) pairs.
    pub fn from_counts(counts: impl IntoIterator<Item = (String, u64)>) -> Self {
        let mut rows: Vec<AggregateRow> = counts
            .into_iter()
            .map(|(label, count)| AggregateRow::new(label, count))
            .collect();
        rows.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.group_label.cmp(&b.group_label))
        });
        Self(rows)
    }

    /// Builds a result from rows already in contract order.
    ///
    /// Used by adapters whose query returns rows pre-sorted.
    pub fn from_sorted_rows(rows: Vec<AggregateRow>) -> Self {
        debug_assert!(rows.windows(2).all(|w| {
            w[0].count > w[1].count
                || (w[0].count == w[1].count && w[0].group_label <= w[1].group_label)
        }));
        Self(rows)
    }

    /// An aggregate with no rows (partition matched nothing).
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// The ordered rows.
    pub fn rows(&self) -> &[AggregateRow] {
        &self.0
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the partition matched no records.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl IntoIterator for AggregateResult {
    type Item = AggregateRow;
    type IntoIter = std::vec::IntoIter<AggregateRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// A freshly computed aggregate ready to be pushed to one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateUpdate {
    /// The partition the aggregate covers.
    pub partition_key: PartitionKey,

    /// Grouped counts in contract order.
    pub rows: AggregateResult,

    /// When the computation finished.
    pub computed_at: DateTime<Utc>,
}

impl AggregateUpdate {
    /// Creates an update stamped with the current time.
    pub fn new(partition_key: PartitionKey, rows: AggregateResult) -> Self {
        Self {
            partition_key,
            rows,
            computed_at: Utc::now(),
        }
    }
}
