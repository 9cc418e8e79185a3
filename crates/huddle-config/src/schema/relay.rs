use serde::{Deserialize, Serialize};

/// Connection settings for the signal relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// WebSocket URL of the relay server.
    pub url: String,
    /// Heartbeat interval in seconds.
    pub heartbeat_interval: u32,
    /// Base reconnect delay in seconds.
    pub reconnect_delay: u32,
    /// Upper bound for the reconnect backoff in seconds.
    pub max_reconnect_delay: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: "wss://relay.huddle.chat/socket/websocket".into(),
            heartbeat_interval: 25,
            reconnect_delay: 1,
            max_reconnect_delay: 30,
        }
    }
}
