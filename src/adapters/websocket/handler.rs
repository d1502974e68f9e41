//! WebSocket upgrade handler for live aggregate connections.
//!
//! Handles the HTTP → WebSocket upgrade and manages the connection lifecycle:
//! 1. Upgrade to WebSocket
//! 2. Register a session and open its outbound channel
//! 3. Send/receive messages until disconnect
//! 4. Tear down session and channel

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use chrono::Utc;
use futures::{SinkExt, StreamExt};

use crate::application::BroadcastCoordinator;
use crate::domain::{PartitionKey, SessionId};

use super::{
    messages::{ClientMessage, ConnectedMessage, PongMessage, ServerMessage},
    transport::ClientChannels,
};

/// State required for WebSocket handling.
#[derive(Clone)]
pub struct WebSocketState {
    /// Orchestrates recompute-and-push for all sessions.
    pub coordinator: Arc<BroadcastCoordinator>,

    /// Outbound channel table the coordinator pushes through.
    pub channels: Arc<ClientChannels>,
}

impl WebSocketState {
    /// Create a new WebSocket state.
    pub fn new(coordinator: Arc<BroadcastCoordinator>, channels: Arc<ClientChannels>) -> Self {
        Self {
            coordinator,
            channels,
        }
    }
}

/// Handle WebSocket upgrade requests for the live aggregate stream.
///
/// Route: `GET /api/live`
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<WebSocketState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle an established WebSocket connection.
///
/// This function runs for the lifetime of the connection, handling:
/// - Session registration and the first aggregate push
/// - Forwarding queued updates to the client
/// - Processing client messages (partition selection, ping)
/// - Cleanup on disconnect
async fn handle_socket(socket: WebSocket, state: WebSocketState) {
    let (mut sender, mut receiver) = socket.split();

    let session_id = state.coordinator.registry().register();
    let mut updates = state.channels.open(session_id).await;

    // Acknowledge before the first aggregate goes out.
    let connected = ServerMessage::Connected(ConnectedMessage {
        session_id: session_id.to_string(),
        timestamp: Utc::now().to_rfc3339(),
    });
    if let Err(e) = send_message(&mut sender, &connected).await {
        tracing::debug!(session_id = %session_id, "Failed to send connected message: {}", e);
        state.coordinator.on_disconnect(session_id);
        state.channels.close(session_id).await;
        return; // Client disconnected immediately
    }

    // First aggregate for the (still empty) partition key.
    state.coordinator.on_connect(session_id);

    // Forward queued updates to the client.
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = updates.recv().await {
            if let Err(e) = send_message(&mut sender, &msg).await {
                tracing::debug!(
                    session_id = %session_id,
                    "Send error, closing connection: {}",
                    e
                );
                break;
            }
        }
    });

    // Handle incoming messages from the client.
    let coordinator = Arc::clone(&state.coordinator);
    let channels = Arc::clone(&state.channels);
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Text(text)) => {
                    handle_client_message(&coordinator, &channels, session_id, &text).await;
                }
                Ok(Message::Binary(_)) => {
                    tracing::warn!(
                        session_id = %session_id,
                        "Received unsupported binary message"
                    );
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                    // WebSocket protocol frames - handled automatically by axum
                }
                Ok(Message::Close(_)) => {
                    tracing::debug!(session_id = %session_id, "Client sent close frame");
                    break;
                }
                Err(e) => {
                    tracing::debug!(session_id = %session_id, "Receive error: {}", e);
                    break;
                }
            }
        }
    });

    // Whichever side finishes first ends the connection.
    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    state.coordinator.on_disconnect(session_id);
    state.channels.close(session_id).await;
}

/// Dispatch one parsed client message.
async fn handle_client_message(
    coordinator: &Arc<BroadcastCoordinator>,
    channels: &Arc<ClientChannels>,
    session_id: SessionId,
    text: &str,
) {
    let client_msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::debug!(session_id = %session_id, "Unparseable client message: {}", e);
            return;
        }
    };

    match client_msg {
        ClientMessage::Ping => {
            let pong = ServerMessage::Pong(PongMessage {
                timestamp: Utc::now().to_rfc3339(),
            });
            if let Err(e) = channels.notify(session_id, pong).await {
                tracing::debug!(session_id = %session_id, "Pong undeliverable: {}", e);
            }
        }
        ClientMessage::SetPartition { key } => {
            coordinator.on_partition_key_change(session_id, PartitionKey::new(key));
        }
    }
}

/// Send a JSON message over the WebSocket.
async fn send_message(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(msg).expect("ServerMessage serialization should not fail");
    sender.send(Message::Text(json)).await
}

/// Create axum router for the WebSocket endpoint.
///
/// # Example
///
/// ```ignore
/// let app = Router::new()
///     .nest("/api", websocket_router())
///     .with_state(ws_state);
/// ```
pub fn websocket_router() -> axum::Router<WebSocketState> {
    use axum::routing::get;

    axum::Router::new().route("/live", get(ws_handler))
}
