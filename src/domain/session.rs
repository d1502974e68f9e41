//! Subscriber session value objects.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The value a session uses to scope which records its aggregate covers.
///
/// Empty until the client picks a partition; an empty key is a valid
/// input to the aggregation engine and simply matches no records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionKey(String);

impl PartitionKey {
    /// Creates a partition key from any string-like value.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the default, never-set key.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PartitionKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PartitionKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}
