//! Public handle for the WebSocket signal relay.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use huddle_common::{ParticipantId, RoomId, VoiceError};

use crate::ports::{InboundSignal, SignalRelay};
use crate::protocol::{room_topic, SignalEnvelope, VoiceSignal};

use super::connection::{connection_loop, Shared};
use super::types::{RelayCommand, RelayConfig};

/// Buffered inbound signals per subscriber.
const SUBSCRIBER_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// [`SignalRelay`] backed by a Phoenix-channel WebSocket connection.
///
/// The connection runs in a background task that is stopped by
/// [`disconnect`](Self::disconnect) or when the handle is dropped.
pub struct WebSocketSignalRelay {
    command_tx: mpsc::Sender<RelayCommand>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
}

impl WebSocketSignalRelay {
    /// Create the relay and start the background connection. Must be called
    /// inside a tokio runtime.
    pub fn connect(config: RelayConfig) -> Self {
        let (command_tx, command_rx) = mpsc::channel(64);
        let shared = Arc::new(Shared::default());
        let cancel = CancellationToken::new();

        tokio::spawn(connection_loop(
            config,
            Arc::clone(&shared),
            command_rx,
            cancel.clone(),
        ));

        Self {
            command_tx,
            shared,
            cancel,
        }
    }

    pub async fn is_connected(&self) -> bool {
        *self.shared.connected.read().await
    }

    /// Stop the connection task. Subscribers see their streams end.
    pub async fn disconnect(&self) {
        self.cancel.cancel();
        self.shared.routes.write().await.clear();
    }

    async fn command(&self, command: RelayCommand) -> Result<(), VoiceError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| VoiceError::SignalingFailure("relay connection stopped".into()))
    }
}

impl Drop for WebSocketSignalRelay {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[async_trait]
impl SignalRelay for WebSocketSignalRelay {
    async fn send(
        &self,
        room: &RoomId,
        from: &ParticipantId,
        to: &ParticipantId,
        signal: VoiceSignal,
    ) -> Result<(), VoiceError> {
        if !self.is_connected().await {
            return Err(VoiceError::SignalingFailure("relay not connected".into()));
        }
        debug!(%room, %from, %to, kind = signal.kind(), "Relaying voice signal");
        self.command(RelayCommand::Signal {
            topic: room_topic(room),
            envelope: SignalEnvelope {
                from: from.clone(),
                to: to.clone(),
                signal,
            },
        })
        .await
    }

    async fn subscribe(
        &self,
        room: &RoomId,
        local: &ParticipantId,
    ) -> Result<mpsc::Receiver<InboundSignal>, VoiceError> {
        if self.cancel.is_cancelled() {
            return Err(VoiceError::SignalingFailure("relay connection stopped".into()));
        }
        let topic = room_topic(room);
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        let first = self.shared.routes.write().await.add(&topic, local.clone(), tx);
        if first {
            self.command(RelayCommand::Join { topic }).await?;
        }
        Ok(rx)
    }
}
