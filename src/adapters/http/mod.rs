//! HTTP adapters - REST API implementations.
//!
//! One endpoint family: the initial aggregate fetch clients perform
//! before subscribing to the live WebSocket stream.

pub mod aggregate;

// Re-export key types for convenience
pub use aggregate::aggregate_router;
pub use aggregate::AggregateApiState;
