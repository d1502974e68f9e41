//! Recompute engine configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Configuration for the recompute-and-push engine
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Deadline for a single aggregate computation, in milliseconds
    #[serde(default = "default_compute_timeout_ms")]
    pub compute_timeout_ms: u64,

    /// Maximum aggregate computations running at once across all sessions
    #[serde(default = "default_max_concurrent_recomputes")]
    pub max_concurrent_recomputes: usize,

    /// Buffer size of each session's outbound push channel
    #[serde(default = "default_push_channel_capacity")]
    pub push_channel_capacity: usize,
}

impl EngineConfig {
    /// Get the compute deadline as a Duration
    pub fn compute_timeout(&self) -> Duration {
        Duration::from_millis(self.compute_timeout_ms)
    }

    /// Validate engine configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.compute_timeout_ms == 0 {
            return Err(ValidationError::InvalidComputeTimeout);
        }
        if self.max_concurrent_recomputes == 0 {
            return Err(ValidationError::InvalidRecomputeConcurrency);
        }
        if self.push_channel_capacity == 0 {
            return Err(ValidationError::InvalidChannelCapacity);
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            compute_timeout_ms: default_compute_timeout_ms(),
            max_concurrent_recomputes: default_max_concurrent_recomputes(),
            push_channel_capacity: default_push_channel_capacity(),
        }
    }
}

fn default_compute_timeout_ms() -> u64 {
    5_000
}

fn default_max_concurrent_recomputes() -> usize {
    8
}

fn default_push_channel_capacity() -> usize {
    64
}
