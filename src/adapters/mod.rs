//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the application core to external systems:
//! - `postgres` - Aggregate queries and the LISTEN/NOTIFY change feed
//! - `websocket` - Client connections and the push transport
//! - `http` - REST endpoint for the initial aggregate fetch

pub mod http;
pub mod postgres;
pub mod websocket;

pub use postgres::{PgChangeFeed, PostgresAggregateSource};
pub use websocket::ClientChannels;
