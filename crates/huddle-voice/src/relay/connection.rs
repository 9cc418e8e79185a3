//! Background WebSocket connection loop with auto-reconnect.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::protocol::events;

use super::handler::{handle_phoenix_message, Routes};
use super::types::{PhoenixMessage, RelayCommand, RelayConfig};

// ---------------------------------------------------------------------------
// Ref Counter
// ---------------------------------------------------------------------------

/// Monotonically increasing ref counter for Phoenix messages.
static REF_COUNTER: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_ref() -> String {
    REF_COUNTER.fetch_add(1, Ordering::Relaxed).to_string()
}

/// State shared between the relay handle and its connection task.
#[derive(Default)]
pub(crate) struct Shared {
    pub(crate) connected: RwLock<bool>,
    pub(crate) routes: RwLock<Routes>,
}

type Joined = Arc<Mutex<HashSet<String>>>;

async fn send_frame<S>(writer: &Mutex<S>, msg: &PhoenixMessage) -> bool
where
    S: Sink<WsMessage> + Unpin,
{
    let Ok(json) = serde_json::to_string(msg) else {
        return false;
    };
    let mut writer = writer.lock().await;
    writer.send(WsMessage::Text(json.into())).await.is_ok()
}

// ---------------------------------------------------------------------------
// Connection Loop
// ---------------------------------------------------------------------------

/// Background task managing the WebSocket connection with auto-reconnect.
/// Runs until `cancel` fires.
pub(crate) async fn connection_loop(
    config: RelayConfig,
    shared: Arc<Shared>,
    command_rx: mpsc::Receiver<RelayCommand>,
    cancel: CancellationToken,
) {
    let command_rx = Arc::new(Mutex::new(command_rx));
    let mut reconnect_delay = config.reconnect_delay;

    loop {
        let url = config.ws_url();
        info!(url = %url.split('?').next().unwrap_or(""), "Connecting to signal relay");

        let attempt = tokio::select! {
            _ = cancel.cancelled() => return,
            attempt = tokio::time::timeout(
                config.connect_timeout,
                tokio_tungstenite::connect_async(&url),
            ) => attempt,
        };

        match attempt {
            Ok(Ok((ws_stream, _))) => {
                reconnect_delay = config.reconnect_delay;
                *shared.connected.write().await = true;
                info!("Signal relay connected");

                let (ws_write, mut ws_read) = ws_stream.split();
                let ws_write = Arc::new(Mutex::new(ws_write));
                let joined: Joined = Arc::default();

                // Rejoin every topic that still has subscribers.
                let topics = shared.routes.read().await.topics();
                for topic in topics {
                    if send_frame(&ws_write, &PhoenixMessage::join(&topic, next_ref())).await {
                        debug!(topic = %topic, "Rejoined channel");
                        joined.lock().await.insert(topic);
                    }
                }

                let heartbeat_handle = tokio::spawn(heartbeat_task(
                    Arc::clone(&ws_write),
                    config.heartbeat_interval,
                ));
                let cmd_handle = tokio::spawn(command_forwarder(
                    Arc::clone(&command_rx),
                    Arc::clone(&ws_write),
                    Arc::clone(&joined),
                ));

                loop {
                    let next = tokio::select! {
                        _ = cancel.cancelled() => {
                            let mut writer = ws_write.lock().await;
                            let _ = writer.send(WsMessage::Close(None)).await;
                            None
                        }
                        next = ws_read.next() => next,
                    };
                    match next {
                        Some(Ok(WsMessage::Text(text))) => {
                            match serde_json::from_str::<PhoenixMessage>(&text) {
                                Ok(msg) => {
                                    handle_phoenix_message(&msg, &*shared.routes.read().await);
                                }
                                Err(_) => {
                                    debug!(text = %text, "Unrecognized message from relay");
                                }
                            }
                            leave_abandoned(&shared, &ws_write, &joined).await;
                        }
                        Some(Ok(WsMessage::Close(_))) => {
                            info!("Signal relay closed connection");
                            break;
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "WebSocket error");
                            break;
                        }
                        Some(Ok(_)) => {}
                        None => break,
                    }
                }

                heartbeat_handle.abort();
                cmd_handle.abort();
                *shared.connected.write().await = false;
                if cancel.is_cancelled() {
                    info!("Signal relay disconnected");
                    return;
                }
            }
            Ok(Err(e)) => {
                error!(error = %e, "Failed to connect to signal relay");
            }
            Err(_elapsed) => {
                error!(
                    timeout_ms = config.connect_timeout.as_millis() as u64,
                    "Signal relay connection timed out"
                );
            }
        }

        // Exponential backoff reconnect.
        info!(delay_ms = reconnect_delay.as_millis() as u64, "Reconnecting to signal relay");
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(reconnect_delay) => {}
        }
        reconnect_delay = config.next_delay(reconnect_delay);
    }
}

/// Leaves topics whose subscribers have all gone away.
async fn leave_abandoned<S>(shared: &Shared, writer: &Mutex<S>, joined: &Joined)
where
    S: Sink<WsMessage> + Unpin,
{
    let emptied = shared.routes.write().await.prune();
    for topic in emptied {
        if joined.lock().await.remove(&topic) {
            debug!(topic = %topic, "Leaving abandoned channel");
            send_frame(writer, &PhoenixMessage::leave(&topic, next_ref())).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Heartbeat
// ---------------------------------------------------------------------------

async fn heartbeat_task<S>(ws_write: Arc<Mutex<S>>, period: Duration)
where
    S: Sink<WsMessage> + Unpin,
{
    let mut interval = tokio::time::interval(period);
    // The first tick completes immediately.
    interval.tick().await;
    loop {
        interval.tick().await;
        if !send_frame(&ws_write, &PhoenixMessage::heartbeat(next_ref())).await {
            break;
        }
    }
}

// ---------------------------------------------------------------------------
// Command Forwarder
// ---------------------------------------------------------------------------

async fn command_forwarder<S>(
    cmd_rx: Arc<Mutex<mpsc::Receiver<RelayCommand>>>,
    cmd_write: Arc<Mutex<S>>,
    joined: Joined,
) where
    S: Sink<WsMessage> + Unpin,
{
    let mut rx = cmd_rx.lock().await;
    while let Some(cmd) = rx.recv().await {
        match cmd {
            RelayCommand::Join { topic } => {
                if joined.lock().await.contains(&topic) {
                    continue;
                }
                if send_frame(&cmd_write, &PhoenixMessage::join(&topic, next_ref())).await {
                    joined.lock().await.insert(topic);
                }
            }
            RelayCommand::Leave { topic } => {
                if joined.lock().await.remove(&topic) {
                    send_frame(&cmd_write, &PhoenixMessage::leave(&topic, next_ref())).await;
                }
            }
            RelayCommand::Signal { topic, envelope } => {
                let payload = match serde_json::to_value(&envelope) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(error = %e, "Failed to encode voice signal");
                        continue;
                    }
                };
                let msg = PhoenixMessage::broadcast(&topic, events::VOICE_SIGNAL, payload, next_ref());
                if !send_frame(&cmd_write, &msg).await {
                    warn!(topic = %topic, to = %envelope.to, "Voice signal dropped, socket closed");
                }
            }
        }
    }
}
