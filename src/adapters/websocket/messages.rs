//! WebSocket message types for the live aggregate protocol.
//!
//! Defines the protocol between server and connected clients:
//! - Server → Client: Connection status, aggregate updates, errors, pings
//! - Client → Server: Partition selection, pings

use serde::{Deserialize, Serialize};

use crate::domain::{AggregateResult, AggregateUpdate};

// ============================================
// Server → Client Messages
// ============================================

/// All message types that can be sent from server to client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection established and session assigned.
    Connected(ConnectedMessage),

    /// Fresh aggregate for the session's partition.
    #[serde(rename = "aggregate.update")]
    AggregateUpdate(AggregateUpdateMessage),

    /// Error occurred.
    Error(ErrorMessage),

    /// Heartbeat response.
    Pong(PongMessage),
}

/// Sent when a client successfully connects.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedMessage {
    pub session_id: String,
    pub timestamp: String,
}

/// Aggregate update with ordered rows.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateUpdateMessage {
    pub partition_key: String,
    pub rows: AggregateResult,
    pub computed_at: String,
}

/// Error message sent to client.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorMessage {
    pub code: String,
    pub message: String,
    pub timestamp: String,
}

/// Heartbeat response.
#[derive(Debug, Clone, Serialize)]
pub struct PongMessage {
    pub timestamp: String,
}

impl From<AggregateUpdate> for ServerMessage {
    /// Converts a computed update into its wire form.
    fn from(update: AggregateUpdate) -> Self {
        ServerMessage::AggregateUpdate(AggregateUpdateMessage {
            partition_key: update.partition_key.as_str().to_string(),
            rows: update.rows,
            computed_at: update.computed_at.to_rfc3339(),
        })
    }
}

// ============================================
// Client → Server Messages
// ============================================

/// All message types that can be received from client.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Heartbeat request.
    Ping,

    /// Select the partition this session's aggregate covers.
    #[serde(rename = "set_partition")]
    SetPartition { key: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PartitionKey;

    #[test]
    fn server_message_serializes_with_type_tag() {
        let msg = ServerMessage::Connected(ConnectedMessage {
            session_id: "session-123".to_string(),
            timestamp: "2026-01-10T00:00:00Z".to_string(),
        });

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"connected""#));
        assert!(json.contains(r#""sessionId":"session-123""#));
    }

    #[test]
    fn aggregate_update_serializes_rows_in_order() {
        let update = AggregateUpdate::new(
            PartitionKey::new("sensor-7"),
            AggregateResult::from_counts(vec![("A".to_string(), 3), ("B".to_string(), 5)]),
        );

        let json = serde_json::to_string(&ServerMessage::from(update)).unwrap();
        assert!(json.contains(r#""type":"aggregate.update""#));
        assert!(json.contains(r#""partitionKey":"sensor-7""#));
        // B (5) sorts ahead of A (3).
        let b_pos = json.find(r#""groupLabel":"B""#).unwrap();
        let a_pos = json.find(r#""groupLabel":"A""#).unwrap();
        assert!(b_pos < a_pos);
    }

    #[test]
    fn client_message_deserializes_ping() {
        let json = r#"{"type": "ping"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(msg, ClientMessage::Ping));
    }

    #[test]
    fn client_message_deserializes_set_partition() {
        let json = r#"{"type": "set_partition", "key": "sensor-7"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(msg, ClientMessage::SetPartition { key } if key == "sensor-7"));
    }

    #[test]
    fn error_message_serializes_correctly() {
        let msg = ServerMessage::Error(ErrorMessage {
            code: "BAD_MESSAGE".to_string(),
            message: "Unrecognized message".to_string(),
            timestamp: "2026-01-10T00:00:00Z".to_string(),
        });

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"error""#));
        assert!(json.contains(r#""code":"BAD_MESSAGE""#));
    }
}
