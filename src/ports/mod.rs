//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the application core and the outside world. Adapters implement these
//! ports.
//!
//! - `AggregateSource` - computes the grouped count aggregate for a partition
//! - `ChangeFeed` - raw change-event subscription from the storage collaborator
//! - `TransportSink` - push side of the bidirectional client channel

mod aggregate_source;
mod change_feed;
mod transport;

pub use aggregate_source::{AggregateSource, ComputeError};
pub use change_feed::{ChangeEvent, ChangeFeed, ChangeStream, FeedError};
pub use transport::{TransportError, TransportSink};
