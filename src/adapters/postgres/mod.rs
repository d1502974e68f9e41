//! PostgreSQL adapters - Database implementations for storage ports.
//!
//! This module provides adapters for the PostgreSQL-backed data collection:
//! - `PostgresAggregateSource` - Grouped count queries over the events table
//! - `PgChangeFeed` - Change feed over LISTEN/NOTIFY

mod aggregate_source;
mod change_feed;

pub use aggregate_source::PostgresAggregateSource;
pub use change_feed::PgChangeFeed;
