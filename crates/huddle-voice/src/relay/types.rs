//! Configuration, Phoenix frames and commands for the relay connection.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol::SignalEnvelope;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Connection settings for [`WebSocketSignalRelay`](super::WebSocketSignalRelay).
#[derive(Clone)]
pub struct RelayConfig {
    /// WebSocket endpoint, e.g. `wss://relay.example/socket/websocket`.
    pub url: String,
    /// Optional bearer token appended to the connect URL.
    pub access_token: Option<String>,
    pub heartbeat_interval: Duration,
    /// First reconnect delay; doubled after every failed attempt.
    pub reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,
    pub connect_timeout: Duration,
}

impl std::fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayConfig")
            .field("url", &self.url)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("reconnect_delay", &self.reconnect_delay)
            .field("max_reconnect_delay", &self.max_reconnect_delay)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            access_token: None,
            heartbeat_interval: Duration::from_secs(25),
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(15),
        }
    }
}

impl RelayConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Connect URL with the protocol version and token query parameters.
    pub(crate) fn ws_url(&self) -> String {
        let separator = if self.url.contains('?') { '&' } else { '?' };
        let mut url = format!("{}{separator}vsn=1.0.0", self.url);
        if let Some(token) = &self.access_token {
            url.push_str("&token=");
            url.push_str(token);
        }
        url
    }

    /// Delay before the attempt following one that waited `current`.
    pub(crate) fn next_delay(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_reconnect_delay)
    }
}

// ---------------------------------------------------------------------------
// Phoenix Protocol Types
// ---------------------------------------------------------------------------

/// A Phoenix protocol message envelope (v1 JSON format).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    pub payload: serde_json::Value,
    #[serde(rename = "ref")]
    pub msg_ref: Option<String>,
}

impl PhoenixMessage {
    pub(crate) fn join(topic: &str, msg_ref: String) -> Self {
        Self {
            topic: topic.to_string(),
            event: "phx_join".to_string(),
            payload: serde_json::json!({}),
            msg_ref: Some(msg_ref),
        }
    }

    pub(crate) fn leave(topic: &str, msg_ref: String) -> Self {
        Self {
            topic: topic.to_string(),
            event: "phx_leave".to_string(),
            payload: serde_json::json!({}),
            msg_ref: Some(msg_ref),
        }
    }

    pub(crate) fn heartbeat(msg_ref: String) -> Self {
        Self {
            topic: "phoenix".to_string(),
            event: "heartbeat".to_string(),
            payload: serde_json::json!({}),
            msg_ref: Some(msg_ref),
        }
    }

    /// A `broadcast` frame whose inner event is `event`.
    pub(crate) fn broadcast(
        topic: &str,
        event: &str,
        payload: serde_json::Value,
        msg_ref: String,
    ) -> Self {
        Self {
            topic: topic.to_string(),
            event: "broadcast".to_string(),
            payload: serde_json::json!({
                "type": "broadcast",
                "event": event,
                "payload": payload
            }),
            msg_ref: Some(msg_ref),
        }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Commands sent from the relay handle to the connection task.
#[derive(Debug)]
pub(crate) enum RelayCommand {
    Join { topic: String },
    Leave { topic: String },
    Signal { topic: String, envelope: SignalEnvelope },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_url_appends_version_and_token() {
        let mut config = RelayConfig::new("wss://relay.test/socket/websocket");
        assert_eq!(config.ws_url(), "wss://relay.test/socket/websocket?vsn=1.0.0");

        config.access_token = Some("jwt".into());
        assert_eq!(
            config.ws_url(),
            "wss://relay.test/socket/websocket?vsn=1.0.0&token=jwt"
        );

        let config = RelayConfig::new("ws://localhost:4000/socket?region=eu");
        assert_eq!(config.ws_url(), "ws://localhost:4000/socket?region=eu&vsn=1.0.0");
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let config = RelayConfig::default();
        let mut delay = config.reconnect_delay;
        let mut seen = Vec::new();
        for _ in 0..7 {
            seen.push(delay.as_secs());
            delay = config.next_delay(delay);
        }
        assert_eq!(seen, vec![1, 2, 4, 8, 16, 30, 30]);
    }

    #[test]
    fn debug_redacts_token() {
        let config = RelayConfig {
            access_token: Some("secret-token".into()),
            ..RelayConfig::new("wss://relay.test")
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn broadcast_frame_wraps_inner_event() {
        let msg = PhoenixMessage::broadcast(
            "voice:standup",
            "voice_signal",
            serde_json::json!({"to": "p-2"}),
            "7".into(),
        );
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["event"], "broadcast");
        assert_eq!(json["ref"], "7");
        assert_eq!(json["payload"]["type"], "broadcast");
        assert_eq!(json["payload"]["event"], "voice_signal");
        assert_eq!(json["payload"]["payload"]["to"], "p-2");
    }

    #[test]
    fn control_frames() {
        let join = serde_json::to_value(PhoenixMessage::join("voice:a", "1".into())).unwrap();
        assert_eq!(join["event"], "phx_join");
        assert_eq!(join["topic"], "voice:a");

        let heartbeat = serde_json::to_value(PhoenixMessage::heartbeat("2".into())).unwrap();
        assert_eq!(heartbeat["topic"], "phoenix");
        assert_eq!(heartbeat["event"], "heartbeat");
    }

    #[test]
    fn parses_server_reply_without_ref() {
        let msg: PhoenixMessage = serde_json::from_str(
            r#"{"topic":"voice:a","event":"phx_close","payload":{},"ref":null}"#,
        )
        .unwrap();
        assert_eq!(msg.event, "phx_close");
        assert!(msg.msg_ref.is_none());
    }
}
