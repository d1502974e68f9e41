//! Pulseboard - Real-Time Aggregate Dashboard Backend
//!
//! Watches an event collection for changes and pushes per-category count
//! aggregates to connected WebSocket clients, scoped per session to a
//! chosen partition of the data.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
