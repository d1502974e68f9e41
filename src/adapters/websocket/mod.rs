//! WebSocket adapters for real-time aggregate delivery.
//!
//! This module provides the infrastructure for pushing freshly computed
//! aggregates to connected frontend clients via WebSocket connections.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                 BroadcastCoordinator                     │
//! │   recompute-and-push, single-flight per session         │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            │ TransportSink::push
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                    ClientChannels                        │
//! │   session-123 → chan    session-456 → chan              │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            │ drained by
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │              handler::handle_socket                      │
//! │   one task pair per connection (send / receive)         │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`messages`] - WebSocket message protocol types
//! - [`transport`] - Per-session outbound channels (TransportSink impl)
//! - [`handler`] - Axum WebSocket upgrade handler

pub mod handler;
pub mod messages;
pub mod transport;

pub use handler::{websocket_router, ws_handler, WebSocketState};
pub use messages::{
    AggregateUpdateMessage, ClientMessage, ConnectedMessage, ErrorMessage, PongMessage,
    ServerMessage,
};
pub use transport::ClientChannels;
