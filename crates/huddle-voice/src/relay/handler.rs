//! Incoming Phoenix frame handling and per-topic signal routing.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use huddle_common::ParticipantId;

use crate::ports::InboundSignal;
use crate::protocol::{events, SignalEnvelope};

use super::types::PhoenixMessage;

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

struct Route {
    local: ParticipantId,
    tx: mpsc::Sender<InboundSignal>,
}

/// Local subscribers per channel topic.
#[derive(Default)]
pub(crate) struct Routes {
    topics: HashMap<String, Vec<Route>>,
}

impl Routes {
    /// Adds a subscriber. Returns `true` if the topic had none and must be
    /// joined.
    pub(crate) fn add(
        &mut self,
        topic: &str,
        local: ParticipantId,
        tx: mpsc::Sender<InboundSignal>,
    ) -> bool {
        let routes = self.topics.entry(topic.to_string()).or_default();
        routes.retain(|r| !r.tx.is_closed());
        let first = routes.is_empty();
        routes.push(Route { local, tx });
        first
    }

    pub(crate) fn clear(&mut self) {
        self.topics.clear();
    }

    pub(crate) fn topics(&self) -> Vec<String> {
        self.topics.keys().cloned().collect()
    }

    /// Drops subscribers whose receiver is gone. Returns the topics left
    /// without any subscriber.
    pub(crate) fn prune(&mut self) -> Vec<String> {
        let mut emptied = Vec::new();
        self.topics.retain(|topic, routes| {
            routes.retain(|r| !r.tx.is_closed());
            if routes.is_empty() {
                emptied.push(topic.clone());
                false
            } else {
                true
            }
        });
        emptied
    }

    /// Hands `envelope` to every subscriber of `topic` it is addressed to.
    /// Returns the number of deliveries.
    pub(crate) fn dispatch(&self, topic: &str, envelope: &SignalEnvelope) -> usize {
        let Some(routes) = self.topics.get(topic) else {
            return 0;
        };
        let mut delivered = 0;
        for route in routes.iter().filter(|r| envelope.is_for(&r.local)) {
            let inbound = InboundSignal {
                from: envelope.from.clone(),
                signal: envelope.signal.clone(),
            };
            match route.tx.try_send(inbound) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(topic = %topic, to = %route.local, "Signal subscriber lagging, dropped signal");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        delivered
    }
}

// ---------------------------------------------------------------------------
// Message Handler
// ---------------------------------------------------------------------------

/// Decodes the envelope of a `voice_signal` broadcast frame.
pub(crate) fn parse_signal(msg: &PhoenixMessage) -> Option<SignalEnvelope> {
    if msg.event != "broadcast" {
        return None;
    }
    let inner_event = msg.payload.get("event").and_then(|e| e.as_str())?;
    if inner_event != events::VOICE_SIGNAL {
        return None;
    }
    let payload = msg.payload.get("payload")?;
    match serde_json::from_value::<SignalEnvelope>(payload.clone()) {
        Ok(envelope) => Some(envelope),
        Err(e) => {
            warn!(topic = %msg.topic, error = %e, "Malformed voice signal");
            None
        }
    }
}

/// Handle a single incoming Phoenix message.
pub(crate) fn handle_phoenix_message(msg: &PhoenixMessage, routes: &Routes) {
    match msg.event.as_str() {
        "phx_reply" => {
            let status = msg
                .payload
                .get("status")
                .and_then(|s| s.as_str())
                .unwrap_or("unknown");
            if status == "ok" {
                debug!(topic = %msg.topic, "Channel reply: ok");
            } else {
                let reason = msg
                    .payload
                    .get("response")
                    .and_then(|r| r.get("reason"))
                    .and_then(|r| r.as_str())
                    .unwrap_or("unknown error");
                warn!(topic = %msg.topic, status = %status, reason = %reason, "Channel reply error");
            }
        }
        "phx_error" => {
            warn!(topic = %msg.topic, "Channel error");
        }
        "phx_close" => {
            info!(topic = %msg.topic, "Channel closed");
        }
        "broadcast" => {
            if let Some(envelope) = parse_signal(msg) {
                let delivered = routes.dispatch(&msg.topic, &envelope);
                debug!(
                    topic = %msg.topic,
                    from = %envelope.from,
                    to = %envelope.to,
                    kind = envelope.signal.kind(),
                    delivered,
                    "Voice signal received"
                );
            }
        }
        _ => {
            debug!(topic = %msg.topic, event = %msg.event, "Unhandled Phoenix event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::VoiceSignal;

    fn frame(topic: &str, inner: &str, payload: serde_json::Value) -> PhoenixMessage {
        PhoenixMessage {
            topic: topic.into(),
            event: "broadcast".into(),
            payload: serde_json::json!({
                "type": "broadcast",
                "event": inner,
                "payload": payload
            }),
            msg_ref: None,
        }
    }

    fn offer_to(to: &str) -> serde_json::Value {
        serde_json::to_value(SignalEnvelope {
            from: ParticipantId::from("alice"),
            to: ParticipantId::from(to),
            signal: VoiceSignal::Offer { sdp: "v=0".into() },
        })
        .unwrap()
    }

    #[test]
    fn parses_voice_signal_frames_only() {
        let envelope = parse_signal(&frame("voice:a", "voice_signal", offer_to("bob"))).unwrap();
        assert_eq!(envelope.from, ParticipantId::from("alice"));
        assert_eq!(envelope.signal.kind(), "offer");

        assert!(parse_signal(&frame("voice:a", "chat", offer_to("bob"))).is_none());
        assert!(parse_signal(&frame("voice:a", "voice_signal", serde_json::json!({"to": 3}))).is_none());
    }

    #[tokio::test]
    async fn dispatch_filters_by_recipient() {
        let mut routes = Routes::default();
        let (bob_tx, mut bob_rx) = mpsc::channel(4);
        let (carol_tx, mut carol_rx) = mpsc::channel(4);
        assert!(routes.add("voice:a", ParticipantId::from("bob"), bob_tx));
        assert!(!routes.add("voice:a", ParticipantId::from("carol"), carol_tx));

        handle_phoenix_message(&frame("voice:a", "voice_signal", offer_to("bob")), &routes);

        let inbound = bob_rx.recv().await.unwrap();
        assert_eq!(inbound.from, ParticipantId::from("alice"));
        assert!(carol_rx.try_recv().is_err());
    }

    #[test]
    fn dispatch_ignores_other_topics() {
        let mut routes = Routes::default();
        let (tx, mut rx) = mpsc::channel(4);
        routes.add("voice:a", ParticipantId::from("bob"), tx);

        let envelope = parse_signal(&frame("voice:b", "voice_signal", offer_to("bob"))).unwrap();
        assert_eq!(routes.dispatch("voice:b", &envelope), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn prune_reports_abandoned_topics() {
        let mut routes = Routes::default();
        let (tx_a, rx_a) = mpsc::channel(4);
        let (tx_b, _rx_b) = mpsc::channel(4);
        routes.add("voice:a", ParticipantId::from("bob"), tx_a);
        routes.add("voice:b", ParticipantId::from("bob"), tx_b);

        drop(rx_a);
        assert_eq!(routes.prune(), vec!["voice:a".to_string()]);
        assert_eq!(routes.topics(), vec!["voice:b".to_string()]);

        // Re-subscribing to a pruned topic requires a new join.
        let (tx, _rx) = mpsc::channel(4);
        assert!(routes.add("voice:a", ParticipantId::from("bob"), tx));
    }
}
