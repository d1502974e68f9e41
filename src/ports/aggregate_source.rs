//! AggregateSource port - computing grouped counts for one partition.
//!
//! The engine is pure with respect to its inputs apart from the current
//! contents of the underlying collection: no caching happens behind this
//! interface. Any caching is the session's last-sent aggregate, owned by
//! the coordinator.

use async_trait::async_trait;

use crate::domain::{AggregateResult, PartitionKey};

/// Errors that can occur while computing an aggregate.
///
/// Both variants are transient: the coordinator logs them and retries on
/// the next trigger, never immediately.
#[derive(Debug, thiserror::Error)]
pub enum ComputeError {
    /// The underlying collection could not be read.
    #[error("Aggregate data unavailable: {0}")]
    DataUnavailable(String),

    /// The computation exceeded its configured deadline.
    #[error("Aggregate computation exceeded its deadline")]
    Timeout,
}

impl From<sqlx::Error> for ComputeError {
    fn from(err: sqlx::Error) -> Self {
        ComputeError::DataUnavailable(err.to_string())
    }
}

/// Port for computing the grouped count aggregate of one partition.
///
/// Records matching the partition key are grouped by a secondary field and
/// counted; the result is ordered by count descending, label ascending.
/// An empty match set is an empty result, not an error.
#[async_trait]
pub trait AggregateSource: Send + Sync {
    /// Computes the aggregate for `partition_key` against the collection's
    /// current contents.
    async fn compute(&self, partition_key: &PartitionKey)
        -> Result<AggregateResult, ComputeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EmptySource;

    #[async_trait]
    impl AggregateSource for EmptySource {
        async fn compute(
            &self,
            _partition_key: &PartitionKey,
        ) -> Result<AggregateResult, ComputeError> {
            Ok(AggregateResult::empty())
        }
    }

    #[tokio::test]
    async fn trait_is_object_safe() {
        let source: Box<dyn AggregateSource> = Box::new(EmptySource);
        let result = source.compute(&PartitionKey::default()).await.unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn sqlx_errors_map_to_data_unavailable() {
        let err: ComputeError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, ComputeError::DataUnavailable(_)));
    }

    #[test]
    fn error_messages() {
        let err = ComputeError::DataUnavailable("connection refused".to_string());
        assert!(format!("{}", err).contains("connection refused"));

        let err = ComputeError::Timeout;
        assert!(format!("{}", err).contains("deadline"));
    }
}
