//! Change feed over PostgreSQL LISTEN/NOTIFY.
//!
//! A trigger on the `events` table runs `pg_notify` on every write; this
//! adapter LISTENs on that channel and surfaces each notification as a
//! zero-payload change event. Delivery guarantees (and reconnect behavior)
//! are PostgreSQL's; coalescing is the change notifier's job upstream.

use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;
use sqlx::postgres::PgListener;
use sqlx::PgPool;

use crate::ports::{ChangeEvent, ChangeFeed, ChangeStream, FeedError};

/// LISTEN/NOTIFY-backed implementation of ChangeFeed.
#[derive(Clone)]
pub struct PgChangeFeed {
    pool: PgPool,
    channel: String,
}

impl PgChangeFeed {
    /// Creates a feed listening on `channel`.
    pub fn new(pool: PgPool, channel: impl Into<String>) -> Self {
        Self {
            pool,
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl ChangeFeed for PgChangeFeed {
    async fn subscribe(&self) -> Result<ChangeStream, FeedError> {
        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(|err| FeedError::Subscribe(err.to_string()))?;
        listener
            .listen(&self.channel)
            .await
            .map_err(|err| FeedError::Subscribe(err.to_string()))?;

        tracing::info!(channel = %self.channel, "Listening for change notifications");

        let stream = stream::try_unfold(listener, |mut listener| async move {
            match listener.recv().await {
                // Payload ignored: the notification only means "changed".
                Ok(_notification) => Ok(Some((ChangeEvent, listener))),
                Err(err) => Err(FeedError::Terminated(err.to_string())),
            }
        })
        .boxed();

        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn feed_remembers_its_channel() {
        let pool = PgPool::connect_lazy("postgresql://localhost/pulseboard")
            .expect("lazy pool never fails to construct");
        let feed = PgChangeFeed::new(pool, "pulseboard_events");
        assert_eq!(feed.channel, "pulseboard_events");
    }
}
