//! TransportSink port - push side of the client channel.
//!
//! The receive side (incoming messages, connects, disconnects) lives in the
//! transport adapter, which invokes the coordinator's operations directly.

use async_trait::async_trait;

use crate::domain::{AggregateUpdate, SessionId};

/// Errors from pushing to a session's channel.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The session's channel is closed. Logged by the caller, never fatal:
    /// a disconnect may race any push.
    #[error("Channel closed for session {0}")]
    Closed(SessionId),
}

/// Port for pushing a computed aggregate to exactly one session.
#[async_trait]
pub trait TransportSink: Send + Sync {
    /// Delivers `update` to `session_id`'s channel.
    async fn push(
        &self,
        session_id: SessionId,
        update: AggregateUpdate,
    ) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AggregateResult, PartitionKey};
    use std::sync::Mutex;

    struct RecordingSink {
        pushed: Mutex<Vec<(SessionId, AggregateUpdate)>>,
    }

    #[async_trait]
    impl TransportSink for RecordingSink {
        async fn push(
            &self,
            session_id: SessionId,
            update: AggregateUpdate,
        ) -> Result<(), TransportError> {
            self.pushed.lock().unwrap().push((session_id, update));
            Ok(())
        }
    }

    #[tokio::test]
    async fn trait_is_object_safe() {
        let sink = RecordingSink {
            pushed: Mutex::new(Vec::new()),
        };
        let id = SessionId::new();
        let update = AggregateUpdate::new(PartitionKey::default(), AggregateResult::empty());

        let sink_ref: &dyn TransportSink = &sink;
        sink_ref.push(id, update).await.unwrap();

        assert_eq!(sink.pushed.lock().unwrap().len(), 1);
    }

    #[test]
    fn closed_error_names_the_session() {
        let id = SessionId::new();
        let err = TransportError::Closed(id);
        assert!(format!("{}", err).contains(&id.to_string()));
    }
}
