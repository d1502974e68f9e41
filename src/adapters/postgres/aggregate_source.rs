//! PostgreSQL implementation of AggregateSource.
//!
//! Computes the per-category counts for one stream of the `events` table.
//! The query does the grouping and ordering; rows come back already in
//! contract order (count descending, category ascending).

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::time::Duration;

use crate::domain::{AggregateResult, AggregateRow, PartitionKey};
use crate::ports::{AggregateSource, ComputeError};

/// PostgreSQL implementation of AggregateSource.
///
/// Carries its own deadline: a query that outlives it fails with
/// [`ComputeError::Timeout`] and the connection is returned to the pool.
#[derive(Clone)]
pub struct PostgresAggregateSource {
    pool: PgPool,
    deadline: Duration,
}

impl PostgresAggregateSource {
    /// Creates a source over `pool` with the given compute deadline.
    pub fn new(pool: PgPool, deadline: Duration) -> Self {
        Self { pool, deadline }
    }

    async fn run_query(&self, partition_key: &PartitionKey) -> Result<AggregateResult, ComputeError> {
        let rows = sqlx::query(
            r#"
            SELECT category, COUNT(*) AS count
            FROM events
            WHERE stream = $1
            GROUP BY category
            ORDER BY count DESC, category ASC
            "#,
        )
        .bind(partition_key.as_str())
        .fetch_all(&self.pool)
        .await?;

        let rows = rows
            .into_iter()
            .map(|row| {
                let category: String = row.get("category");
                let count: i64 = row.get("count");
                AggregateRow::new(category, count.max(0) as u64)
            })
            .collect();

        Ok(AggregateResult::from_sorted_rows(rows))
    }
}

#[async_trait]
impl AggregateSource for PostgresAggregateSource {
    async fn compute(
        &self,
        partition_key: &PartitionKey,
    ) -> Result<AggregateResult, ComputeError> {
        match tokio::time::timeout(self.deadline, self.run_query(partition_key)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(ComputeError::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Query behavior against a live database is covered by deployment
    // smoke tests; here we pin the pieces that don't need a connection.

    #[test]
    fn source_is_cheap_to_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<PostgresAggregateSource>();
    }

    #[test]
    fn negative_counts_clamp_to_zero() {
        // COUNT(*) can't go negative, but the i64 -> u64 projection must
        // never wrap if the query ever changes to an expression that can.
        let clamped = (-5i64).max(0) as u64;
        assert_eq!(clamped, 0);
    }
}
