//! WebSocket signal relay over the Phoenix Channels v1 protocol.
//!
//! Each room maps to one channel topic (`voice:<room>`). Signals are
//! broadcast on that topic as `voice_signal` events carrying a
//! [`SignalEnvelope`](crate::protocol::SignalEnvelope); every client sees
//! every envelope and keeps only those addressed to it. The background
//! connection keeps a heartbeat going and reconnects with exponential
//! backoff, rejoining every subscribed topic.

mod client;
mod connection;
mod handler;
mod types;

pub use client::WebSocketSignalRelay;
pub use types::{PhoenixMessage, RelayConfig};
