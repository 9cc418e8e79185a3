//! Interfaces to the external collaborators.
//!
//! The coordination layer does not store membership, deliver signals,
//! negotiate connections or touch audio hardware itself. Each of those is
//! an implementation of one of the traits below, supplied at construction.
//! [`crate::loopback`] has in-process implementations of all of them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use huddle_common::{ParticipantId, RoomId, VoiceError};

use crate::media::{AnalysisFrame, LocalTrack, MediaStream};
use crate::protocol::VoiceSignal;

// ---------------------------------------------------------------------------
// Membership
// ---------------------------------------------------------------------------

/// What a participant publishes about itself when registering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,
    pub display_name: String,
    pub muted: bool,
}

/// One registration in a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub participant_id: ParticipantId,
    pub profile: Profile,
}

#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// Registers a new participant and returns its session-scoped id.
    async fn register(&self, room: &RoomId, profile: &Profile) -> Result<ParticipantId, VoiceError>;

    async fn remove(&self, room: &RoomId, participant: &ParticipantId) -> Result<(), VoiceError>;

    async fn snapshot(&self, room: &RoomId) -> Result<Vec<Member>, VoiceError>;

    async fn count(&self, room: &RoomId) -> Result<usize, VoiceError>;

    /// Asks the store to drop the registration if this client goes away
    /// without deregistering.
    async fn arm_auto_remove(&self, room: &RoomId, participant: &ParticipantId) -> Result<(), VoiceError>;

    async fn cancel_auto_remove(&self, room: &RoomId, participant: &ParticipantId) -> Result<(), VoiceError>;

    /// Publishes the local mute flag so others can skip detection for us.
    async fn set_muted(&self, room: &RoomId, participant: &ParticipantId, muted: bool) -> Result<(), VoiceError>;
}

// ---------------------------------------------------------------------------
// Signal relay
// ---------------------------------------------------------------------------

/// A signal delivered to the local participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundSignal {
    pub from: ParticipantId,
    pub signal: VoiceSignal,
}

#[async_trait]
pub trait SignalRelay: Send + Sync {
    async fn send(
        &self,
        room: &RoomId,
        from: &ParticipantId,
        to: &ParticipantId,
        signal: VoiceSignal,
    ) -> Result<(), VoiceError>;

    /// Starts delivery of signals addressed to `local` in `room`. Dropping
    /// the receiver ends the subscription.
    async fn subscribe(
        &self,
        room: &RoomId,
        local: &ParticipantId,
    ) -> Result<mpsc::Receiver<InboundSignal>, VoiceError>;
}

// ---------------------------------------------------------------------------
// Peer connections
// ---------------------------------------------------------------------------

/// What a connection primitive reports about its own lifecycle.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// Outgoing signal to relay to the remote side.
    Signal(VoiceSignal),
    /// The remote media stream arrived.
    Stream(MediaStream),
    Closed,
    Error(String),
}

#[derive(Debug)]
pub(crate) struct LinkEvent {
    pub(crate) remote: ParticipantId,
    pub(crate) generation: u64,
    pub(crate) event: ConnectionEvent,
}

/// Event sink handed to a connection primitive.
///
/// Every event is tagged with the remote participant and the generation of
/// the link it was created for, so events from a replaced connection are
/// recognised and dropped.
#[derive(Debug, Clone)]
pub struct LinkEventSender {
    remote: ParticipantId,
    generation: u64,
    tx: mpsc::UnboundedSender<LinkEvent>,
}

impl LinkEventSender {
    pub(crate) fn new(remote: ParticipantId, generation: u64, tx: mpsc::UnboundedSender<LinkEvent>) -> Self {
        Self { remote, generation, tx }
    }

    pub fn remote(&self) -> &ParticipantId {
        &self.remote
    }

    /// Returns `false` once the owning manager is gone.
    pub fn emit(&self, event: ConnectionEvent) -> bool {
        self.tx
            .send(LinkEvent {
                remote: self.remote.clone(),
                generation: self.generation,
                event,
            })
            .is_ok()
    }

    pub fn signal(&self, signal: VoiceSignal) -> bool {
        self.emit(ConnectionEvent::Signal(signal))
    }

    pub fn stream(&self, stream: MediaStream) -> bool {
        self.emit(ConnectionEvent::Stream(stream))
    }

    pub fn closed(&self) -> bool {
        self.emit(ConnectionEvent::Closed)
    }

    pub fn error(&self, reason: impl Into<String>) -> bool {
        self.emit(ConnectionEvent::Error(reason.into()))
    }
}

/// Creates connection primitives.
pub trait PeerConnector: Send + Sync {
    /// Starts a connection to `remote`. The initiating side is expected to
    /// emit its offer through `events` on its own.
    fn connect(
        &self,
        remote: &ParticipantId,
        initiator: bool,
        local_track: Option<LocalTrack>,
        events: LinkEventSender,
    ) -> Result<Box<dyn PeerConnection>, VoiceError>;
}

#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn signal(&self, signal: VoiceSignal) -> Result<(), VoiceError>;

    /// Swaps the outbound audio track without renegotiating.
    async fn replace_track(&self, track: LocalTrack) -> Result<(), VoiceError>;

    fn close(&self) -> Result<(), VoiceError>;
}

// ---------------------------------------------------------------------------
// Audio
// ---------------------------------------------------------------------------

/// Source an analysis tap is attached to.
pub enum AnalysisInput<'a> {
    /// Post-gain local capture.
    Capture(&'a dyn CaptureStream),
    Remote(&'a MediaStream),
}

#[async_trait]
pub trait AudioBackend: Send + Sync {
    /// Acquires the microphone. `None` selects the system default.
    async fn open_capture(&self, device_id: Option<&str>) -> Result<Box<dyn CaptureStream>, VoiceError>;

    fn open_sink(&self, stream: &MediaStream, output_device: Option<&str>) -> Result<Box<dyn AudioSink>, VoiceError>;

    fn open_analyser(&self, input: AnalysisInput<'_>) -> Result<Box<dyn AnalysisTap>, VoiceError>;
}

/// Live microphone capture: device, gain stage and outbound track.
pub trait CaptureStream: Send + Sync {
    /// The device that was actually opened.
    fn device_id(&self) -> &str;
    fn set_track_enabled(&self, enabled: bool);
    fn track_enabled(&self) -> bool;
    fn set_gain(&self, gain: f32);
    fn outbound_track(&self) -> LocalTrack;
    fn stop(&self);
}

/// Playback of one remote stream.
pub trait AudioSink: Send + Sync {
    fn set_volume(&self, volume: f32) -> Result<(), VoiceError>;
    fn release(&self) -> Result<(), VoiceError>;
}

pub trait AnalysisTap: Send {
    /// Latest frame, or `None` when the source has no data.
    fn sample(&mut self) -> Option<AnalysisFrame>;
    fn close(&mut self);
}

/// Persisted microphone choice.
pub trait DevicePreferences: Send + Sync {
    fn preferred_input(&self) -> Option<String>;
    fn store_input(&self, device_id: &str) -> Result<(), VoiceError>;
}
