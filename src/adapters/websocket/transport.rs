//! Per-session outbound channels for WebSocket delivery.
//!
//! Each connected session owns one bounded channel. The connection handler
//! holds the receiving end and forwards messages onto the socket; the
//! coordinator pushes through the [`TransportSink`] port and never touches
//! a socket directly.
//!
//! # Thread Safety
//!
//! Uses `RwLock` for the channel table since pushes (reads) vastly
//! outnumber opens/closes (writes). The lock is released before any send,
//! so a full channel never blocks table access.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};

use crate::domain::{AggregateUpdate, SessionId};
use crate::ports::{TransportError, TransportSink};

use super::messages::ServerMessage;

/// Table of per-session outbound channels.
pub struct ClientChannels {
    channels: RwLock<HashMap<SessionId, mpsc::Sender<ServerMessage>>>,

    /// Buffer size for each session's channel. A client that falls this
    /// far behind starts missing intermediate aggregates.
    capacity: usize,
}

impl ClientChannels {
    /// Creates a channel table with the given per-session capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// Create with default capacity (64 messages).
    pub fn with_default_capacity() -> Self {
        Self::new(64)
    }

    /// Opens the outbound channel for a session.
    ///
    /// Returns the receiving end for the connection handler to drain.
    /// Opening again for the same session replaces the previous channel.
    pub async fn open(&self, session_id: SessionId) -> mpsc::Receiver<ServerMessage> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.channels.write().await.insert(session_id, tx);
        rx
    }

    /// Drops a session's channel. Subsequent pushes fail with `Closed`.
    pub async fn close(&self, session_id: SessionId) {
        self.channels.write().await.remove(&session_id);
    }

    /// Queues an arbitrary protocol message for a session.
    ///
    /// A full buffer drops the message: aggregate consumers only care
    /// about the latest state, and the next push carries it.
    pub async fn notify(
        &self,
        session_id: SessionId,
        message: ServerMessage,
    ) -> Result<(), TransportError> {
        let sender = {
            let channels = self.channels.read().await;
            channels
                .get(&session_id)
                .cloned()
                .ok_or(TransportError::Closed(session_id))?
        };

        match sender.try_send(message) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!(
                    session_id = %session_id,
                    "Outbound buffer full, dropping update for slow client"
                );
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(TransportError::Closed(session_id)),
        }
    }

    /// Number of sessions with an open channel.
    pub async fn connected_count(&self) -> usize {
        self.channels.read().await.len()
    }
}

impl Default for ClientChannels {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[async_trait]
impl TransportSink for ClientChannels {
    async fn push(
        &self,
        session_id: SessionId,
        update: AggregateUpdate,
    ) -> Result<(), TransportError> {
        self.notify(session_id, ServerMessage::from(update)).await
    }
}
