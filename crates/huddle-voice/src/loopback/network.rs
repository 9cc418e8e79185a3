use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use tracing::debug;

use huddle_common::{ParticipantId, VoiceError};

use crate::media::{LocalTrack, MediaStream};
use crate::ports::{LinkEventSender, PeerConnection, PeerConnector};
use crate::protocol::VoiceSignal;

use super::lock;

const SDP_PREFIX: &str = "loopback:";

/// Pairs connections that negotiated with each other so that closing one
/// end is observed by the other.
#[derive(Default)]
pub struct LoopbackNetwork {
    connections: Mutex<HashMap<u64, Weak<LoopbackConnection>>>,
    next_id: AtomicU64,
}

impl LoopbackNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn open_connections(&self) -> usize {
        lock(&self.connections).len()
    }

    fn register(&self, connection: &Arc<LoopbackConnection>) {
        lock(&self.connections).insert(connection.id, Arc::downgrade(connection));
    }

    fn unregister(&self, id: u64) {
        lock(&self.connections).remove(&id);
    }

    fn notify_closed(&self, id: u64) {
        let peer = lock(&self.connections).get(&id).and_then(Weak::upgrade);
        if let Some(peer) = peer {
            if !peer.is_closed() {
                peer.events.closed();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

/// Creates loopback connections for one client.
pub struct LoopbackConnector {
    network: Arc<LoopbackNetwork>,
    latest: Mutex<HashMap<ParticipantId, Arc<LoopbackConnection>>>,
    refused: Mutex<HashSet<ParticipantId>>,
    connects: AtomicUsize,
}

impl LoopbackConnector {
    pub fn new(network: Arc<LoopbackNetwork>) -> Self {
        Self {
            network,
            latest: Mutex::new(HashMap::new()),
            refused: Mutex::new(HashSet::new()),
            connects: AtomicUsize::new(0),
        }
    }

    /// Makes every future `connect` to `remote` fail.
    pub fn refuse(&self, remote: &ParticipantId) {
        lock(&self.refused).insert(remote.clone());
    }

    /// The most recent connection created towards `remote`.
    pub fn connection(&self, remote: &ParticipantId) -> Option<Arc<LoopbackConnection>> {
        lock(&self.latest).get(remote).cloned()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl PeerConnector for LoopbackConnector {
    fn connect(
        &self,
        remote: &ParticipantId,
        initiator: bool,
        local_track: Option<LocalTrack>,
        events: LinkEventSender,
    ) -> Result<Box<dyn PeerConnection>, VoiceError> {
        if lock(&self.refused).contains(remote) {
            return Err(VoiceError::peer(remote, "connection refused"));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);

        let connection = Arc::new(LoopbackConnection {
            id: self.network.next_id.fetch_add(1, Ordering::Relaxed),
            remote: remote.clone(),
            initiator,
            events,
            network: Arc::downgrade(&self.network),
            peer: Mutex::new(None),
            track: Mutex::new(local_track),
            track_replacements: AtomicUsize::new(0),
            fail_replacement: AtomicBool::new(false),
            fail_close: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });
        self.network.register(&connection);
        lock(&self.latest).insert(remote.clone(), Arc::clone(&connection));

        if initiator {
            connection.events.signal(VoiceSignal::Offer {
                sdp: connection.description(),
            });
        }
        Ok(Box::new(Handle(connection)))
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// One end of a loopback connection.
///
/// Negotiation is a single offer/answer exchange whose descriptions carry
/// the connection ids; each side reports the remote stream as soon as it
/// knows its counterpart.
pub struct LoopbackConnection {
    id: u64,
    remote: ParticipantId,
    initiator: bool,
    events: LinkEventSender,
    network: Weak<LoopbackNetwork>,
    peer: Mutex<Option<u64>>,
    track: Mutex<Option<LocalTrack>>,
    track_replacements: AtomicUsize,
    fail_replacement: AtomicBool,
    fail_close: AtomicBool,
    closed: AtomicBool,
}

impl LoopbackConnection {
    pub fn remote(&self) -> &ParticipantId {
        &self.remote
    }

    pub fn is_initiator(&self) -> bool {
        self.initiator
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn is_paired(&self) -> bool {
        lock(&self.peer).is_some()
    }

    pub fn current_track(&self) -> Option<LocalTrack> {
        lock(&self.track).clone()
    }

    pub fn track_replacements(&self) -> usize {
        self.track_replacements.load(Ordering::SeqCst)
    }

    pub fn fail_track_replacement(&self, fail: bool) {
        self.fail_replacement.store(fail, Ordering::SeqCst);
    }

    /// Makes `close` report an error after tearing the connection down.
    pub fn fail_close(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::SeqCst);
    }

    /// Reports a transport failure to the owning manager.
    pub fn inject_error(&self, reason: &str) {
        self.events.error(reason);
    }

    /// Reports that the remote side hung up.
    pub fn remote_close(&self) {
        self.events.closed();
    }

    fn description(&self) -> String {
        format!("{SDP_PREFIX}{}", self.id)
    }

    fn peer_of(&self, sdp: &str) -> Result<u64, VoiceError> {
        sdp.strip_prefix(SDP_PREFIX)
            .and_then(|id| id.parse::<u64>().ok())
            .ok_or_else(|| VoiceError::peer(&self.remote, "malformed session description"))
    }

    /// Records the paired connection and reports the remote stream.
    fn pair_with(&self, peer: u64) {
        *lock(&self.peer) = Some(peer);
        self.events
            .stream(MediaStream::new(format!("stream-{}", self.remote), ()));
    }

    fn close_once(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let peer = *lock(&self.peer);
        if let Some(network) = self.network.upgrade() {
            network.unregister(self.id);
            if let Some(peer) = peer {
                network.notify_closed(peer);
            }
        }
        debug!(remote = %self.remote, id = self.id, "Loopback connection closed");
    }
}

struct Handle(Arc<LoopbackConnection>);

#[async_trait]
impl PeerConnection for Handle {
    async fn signal(&self, signal: VoiceSignal) -> Result<(), VoiceError> {
        let connection = &self.0;
        if connection.is_closed() {
            return Err(VoiceError::peer(&connection.remote, "connection closed"));
        }
        match signal {
            VoiceSignal::Offer { sdp } if !connection.initiator => {
                let peer = connection.peer_of(&sdp)?;
                connection.events.signal(VoiceSignal::Answer {
                    sdp: connection.description(),
                });
                connection.pair_with(peer);
            }
            VoiceSignal::Answer { sdp } if connection.initiator => {
                let peer = connection.peer_of(&sdp)?;
                connection.pair_with(peer);
            }
            VoiceSignal::IceCandidate { .. } => {}
            other => {
                debug!(remote = %connection.remote, kind = other.kind(), "Ignoring out-of-order signal");
            }
        }
        Ok(())
    }

    async fn replace_track(&self, track: LocalTrack) -> Result<(), VoiceError> {
        let connection = &self.0;
        if connection.fail_replacement.load(Ordering::SeqCst) {
            return Err(VoiceError::peer(&connection.remote, "sender rejected track"));
        }
        *lock(&connection.track) = Some(track);
        connection.track_replacements.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) -> Result<(), VoiceError> {
        self.0.close_once();
        if self.0.fail_close.load(Ordering::SeqCst) {
            return Err(VoiceError::peer(&self.0.remote, "transport close failed"));
        }
        Ok(())
    }
}
