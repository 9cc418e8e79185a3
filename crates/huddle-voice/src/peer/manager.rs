use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use huddle_common::{EventBus, ParticipantId, RoomId, VoiceError};

use crate::audio::{AudioDeviceController, OutboundTrackTarget};
use crate::detector::SpeechActivityDetector;
use crate::events::VoiceEvent;
use crate::media::{LocalTrack, MediaStream};
use crate::ports::{ConnectionEvent, LinkEvent, LinkEventSender, PeerConnection, PeerConnector, SignalRelay};
use crate::protocol::VoiceSignal;

use super::link::{LinkInfo, PeerLink};

#[derive(Debug, Clone)]
struct LinkContext {
    room: RoomId,
    local: ParticipantId,
}

// ---------------------------------------------------------------------------
// Peer Session Manager
// ---------------------------------------------------------------------------

/// Owns one [`PeerLink`] per remote participant.
///
/// The link table is the single owner of every connection handle; links are
/// only created in `ensure_link` and only destroyed in `release`. All
/// connection callbacks arrive through one mailbox and are handled by a
/// dispatcher task in arrival order. Events carrying a stale generation are
/// ignored.
pub struct PeerSessionManager {
    links: Mutex<HashMap<ParticipantId, PeerLink>>,
    context: RwLock<Option<LinkContext>>,
    connector: Arc<dyn PeerConnector>,
    relay: Arc<dyn SignalRelay>,
    audio: Arc<AudioDeviceController>,
    detector: Arc<SpeechActivityDetector>,
    events: EventBus<VoiceEvent>,
    link_tx: mpsc::UnboundedSender<LinkEvent>,
    next_generation: AtomicU64,
    /// Set while leaving; teardown then reports no connection errors.
    closing: AtomicBool,
    dispatcher: JoinHandle<()>,
}

impl PeerSessionManager {
    pub fn new(
        connector: Arc<dyn PeerConnector>,
        relay: Arc<dyn SignalRelay>,
        audio: Arc<AudioDeviceController>,
        detector: Arc<SpeechActivityDetector>,
        events: EventBus<VoiceEvent>,
    ) -> Arc<Self> {
        let (link_tx, link_rx) = mpsc::unbounded_channel();
        Arc::new_cyclic(|weak| Self {
            links: Mutex::new(HashMap::new()),
            context: RwLock::new(None),
            connector,
            relay,
            audio,
            detector,
            events,
            link_tx,
            next_generation: AtomicU64::new(0),
            closing: AtomicBool::new(false),
            dispatcher: tokio::spawn(dispatch(weak.clone(), link_rx)),
        })
    }

    /// Associates links with a room and the local participant id.
    pub async fn bind(&self, room: RoomId, local: ParticipantId) {
        *self.context.write().await = Some(LinkContext { room, local });
    }

    pub async fn unbind(&self) {
        *self.context.write().await = None;
    }

    pub(crate) fn set_closing(&self, closing: bool) {
        self.closing.store(closing, Ordering::SeqCst);
    }

    async fn context(&self) -> Result<LinkContext, VoiceError> {
        self.context
            .read()
            .await
            .clone()
            .ok_or_else(|| VoiceError::NotReady("not in a room".into()))
    }

    // -- Creation -----------------------------------------------------------

    /// Opens an initiating link to `remote`. Returns `false` when a link
    /// already exists.
    pub async fn connect_to(&self, remote: &ParticipantId) -> Result<bool, VoiceError> {
        let (_, _, created) = self.ensure_link(remote, true).await?;
        Ok(created)
    }

    /// Hands an inbound signal to the link for `from`, creating a
    /// responding link first if none exists.
    pub async fn accept_signal(&self, from: &ParticipantId, signal: VoiceSignal) -> Result<(), VoiceError> {
        let (connection, generation, _) = self.ensure_link(from, false).await?;
        debug!(from = %from, kind = signal.kind(), "Inbound signal");
        if let Err(e) = connection.signal(signal).await {
            warn!(participant = %from, error = %e, "Signal rejected by connection");
            self.teardown(from, Some(generation), Some(e.to_string())).await;
            return Err(as_peer_error(from, e));
        }
        Ok(())
    }

    async fn ensure_link(
        &self,
        remote: &ParticipantId,
        initiator: bool,
    ) -> Result<(Arc<dyn PeerConnection>, u64, bool), VoiceError> {
        let context = self.context().await?;
        if remote == &context.local {
            return Err(VoiceError::peer(remote, "cannot link to self"));
        }
        if self.closing.load(Ordering::SeqCst) {
            return Err(VoiceError::NotReady("leaving room".into()));
        }

        let track = self.audio.outbound_track().await;
        let mut links = self.links.lock().await;
        if let Some(link) = links.get(remote) {
            return Ok((Arc::clone(&link.connection), link.generation, false));
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let sender = LinkEventSender::new(remote.clone(), generation, self.link_tx.clone());
        let connection: Arc<dyn PeerConnection> = self
            .connector
            .connect(remote, initiator, track, sender)
            .map_err(|e| as_peer_error(remote, e))?
            .into();
        links.insert(
            remote.clone(),
            PeerLink::new(remote.clone(), generation, initiator, Arc::clone(&connection)),
        );
        self.detector.track(remote).await;
        drop(links);

        info!(
            room_id = %context.room,
            participant = %remote,
            generation,
            initiator,
            "Peer link created"
        );
        self.events.publish(VoiceEvent::PeerConnected {
            participant_id: remote.clone(),
            initiator,
        });
        Ok((connection, generation, true))
    }

    // -- Connection events --------------------------------------------------

    async fn handle_link_event(&self, event: LinkEvent) {
        let LinkEvent {
            remote,
            generation,
            event,
        } = event;
        if !self.is_current(&remote, generation).await {
            debug!(participant = %remote, generation, "Dropping event from stale link");
            return;
        }

        match event {
            ConnectionEvent::Signal(signal) => self.relay_signal(&remote, signal).await,
            ConnectionEvent::Stream(stream) => self.attach_stream(&remote, generation, stream).await,
            ConnectionEvent::Closed => {
                self.teardown(&remote, Some(generation), None).await;
            }
            ConnectionEvent::Error(reason) => {
                warn!(participant = %remote, error = %reason, "Peer connection failed");
                self.teardown(&remote, Some(generation), Some(reason)).await;
            }
        }
    }

    async fn is_current(&self, remote: &ParticipantId, generation: u64) -> bool {
        self.links
            .lock()
            .await
            .get(remote)
            .is_some_and(|link| link.generation == generation)
    }

    async fn relay_signal(&self, remote: &ParticipantId, signal: VoiceSignal) {
        let Ok(context) = self.context().await else {
            return;
        };
        debug!(to = %remote, kind = signal.kind(), "Outbound signal");
        if let Err(e) = self.relay.send(&context.room, &context.local, remote, signal).await {
            warn!(participant = %remote, error = %e, "Signal delivery failed");
            self.events
                .publish(VoiceEvent::Error(format!("signal to {remote} failed: {e}")));
        }
    }

    async fn attach_stream(&self, remote: &ParticipantId, generation: u64, stream: MediaStream) {
        if let Err(e) = self.audio.attach_remote_stream(remote, &stream).await {
            warn!(participant = %remote, error = %e, "Remote audio could not be played");
            self.events
                .publish(VoiceEvent::Error(format!("audio from {remote} unavailable: {e}")));
            return;
        }
        let tap = match self.audio.open_remote_analyser(&stream) {
            Ok(tap) => Some(tap),
            Err(e) => {
                warn!(participant = %remote, error = %e, "Remote analysis unavailable");
                None
            }
        };

        let mut links = self.links.lock().await;
        match links.get_mut(remote) {
            Some(link) if link.generation == generation => {
                link.sink_attached = true;
                if let Some(tap) = tap {
                    self.detector.register_remote(remote.clone(), tap).await;
                    link.analysis_attached = true;
                }
            }
            _ => {
                // Torn down while the sink was being opened.
                drop(links);
                if let Some(mut tap) = tap {
                    tap.close();
                }
                if let Err(e) = self.audio.detach_remote_stream(remote).await {
                    warn!(participant = %remote, error = %e, "Sink release failed");
                }
                return;
            }
        }
        drop(links);

        info!(participant = %remote, stream = stream.id(), "Remote stream started");
        self.events.publish(VoiceEvent::PeerStreamStarted {
            participant_id: remote.clone(),
        });
    }

    // -- Teardown -----------------------------------------------------------

    /// Removes the link if it exists and, when `generation` is given, still
    /// matches.
    async fn teardown(&self, remote: &ParticipantId, generation: Option<u64>, error: Option<String>) -> bool {
        let link = {
            let mut links = self.links.lock().await;
            match links.get(remote) {
                Some(link) if generation.map_or(true, |g| g == link.generation) => links.remove(remote),
                _ => None,
            }
        };
        match link {
            Some(link) => {
                self.release(link, error).await;
                true
            }
            None => false,
        }
    }

    /// Releases sink, analysis and connection in that order. Each step is
    /// attempted regardless of earlier failures.
    async fn release(&self, link: PeerLink, error: Option<String>) {
        let remote = &link.remote;
        if let Err(e) = self.audio.detach_remote_stream(remote).await {
            warn!(participant = %remote, error = %e, "Sink release failed");
        }
        self.detector.unregister_remote(remote).await;
        if let Err(e) = link.connection.close() {
            warn!(participant = %remote, error = %e, "Connection close failed");
        }

        let error = if self.closing.load(Ordering::SeqCst) { None } else { error };
        info!(participant = %remote, generation = link.generation, "Peer link closed");
        self.events.publish(VoiceEvent::PeerDisconnected {
            participant_id: remote.clone(),
            error,
        });
    }

    /// Tears down the link to `remote`. Returns `false` if there was none.
    pub async fn close(&self, remote: &ParticipantId) -> bool {
        self.teardown(remote, None, None).await
    }

    /// Tears down every link and returns how many there were.
    pub async fn close_all(&self) -> usize {
        let links: Vec<PeerLink> = self.links.lock().await.drain().map(|(_, link)| link).collect();
        let count = links.len();
        for link in links {
            self.release(link, None).await;
        }
        if count > 0 {
            info!(count, "All peer links closed");
        }
        count
    }

    // -- Queries ------------------------------------------------------------

    pub async fn link_count(&self) -> usize {
        self.links.lock().await.len()
    }

    pub async fn has_link(&self, remote: &ParticipantId) -> bool {
        self.links.lock().await.contains_key(remote)
    }

    pub async fn is_streaming(&self, remote: &ParticipantId) -> bool {
        self.links
            .lock()
            .await
            .get(remote)
            .is_some_and(|link| link.sink_attached)
    }

    /// Links ordered by participant id.
    pub async fn links(&self) -> Vec<LinkInfo> {
        let mut infos: Vec<LinkInfo> = self.links.lock().await.values().map(PeerLink::info).collect();
        infos.sort_by(|a, b| a.participant_id.cmp(&b.participant_id));
        infos
    }
}

#[async_trait]
impl OutboundTrackTarget for PeerSessionManager {
    async fn replace_outbound_track(&self, track: LocalTrack) -> Result<usize, VoiceError> {
        let connections: Vec<(ParticipantId, Arc<dyn PeerConnection>)> = self
            .links
            .lock()
            .await
            .values()
            .map(|link| (link.remote.clone(), Arc::clone(&link.connection)))
            .collect();
        for (remote, connection) in &connections {
            connection
                .replace_track(track.clone())
                .await
                .map_err(|e| as_peer_error(remote, e))?;
        }
        debug!(count = connections.len(), track = track.id(), "Outbound track replaced");
        Ok(connections.len())
    }
}

impl Drop for PeerSessionManager {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}

async fn dispatch(manager: Weak<PeerSessionManager>, mut rx: mpsc::UnboundedReceiver<LinkEvent>) {
    while let Some(event) = rx.recv().await {
        let Some(manager) = manager.upgrade() else {
            break;
        };
        manager.handle_link_event(event).await;
    }
}

fn as_peer_error(remote: &ParticipantId, err: VoiceError) -> VoiceError {
    match err {
        VoiceError::PeerConnectionError { .. } => err,
        other => VoiceError::peer(remote, other.to_string()),
    }
}
