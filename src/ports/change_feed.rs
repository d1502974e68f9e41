//! ChangeFeed port - raw change-event subscription.
//!
//! The storage collaborator owns delivery guarantees and reconnection; this
//! port only exposes the live subscription. Coalescing of bursts into a
//! level-triggered signal happens above, in the change notifier.

use async_trait::async_trait;
use futures::stream::BoxStream;

/// A raw change event. Zero payload: it means "recompute may now yield
/// different results", nothing more.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeEvent;

/// Infinite stream of raw change events, terminated only by error.
pub type ChangeStream = BoxStream<'static, Result<ChangeEvent, FeedError>>;

/// Errors from the change-feed subscription.
///
/// Fatal to the current subscription: once yielded, no further signals
/// arrive until the owning process establishes a new subscription.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FeedError {
    /// The subscription could not be established.
    #[error("Change feed subscription failed: {0}")]
    Subscribe(String),

    /// An established subscription terminated.
    #[error("Change feed terminated: {0}")]
    Terminated(String),
}

/// Port for watching the data collection for changes.
///
/// One live subscription per process lifetime; `subscribe` is called once
/// at startup.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Opens the subscription and returns the event stream.
    async fn subscribe(&self) -> Result<ChangeStream, FeedError>;
}
