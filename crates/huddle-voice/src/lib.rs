//! Peer-session coordination layer for mesh voice rooms.
//!
//! Turns room membership into a full mesh of peer connections, owns the
//! per-peer audio resources, detects who is speaking and serialises
//! join/leave. Media transport, membership storage and signal delivery are
//! external collaborators described in [`ports`].

pub mod audio;
pub mod detector;
pub mod events;
pub mod identity;
pub mod loopback;
pub mod media;
pub mod peer;
pub mod ports;
pub mod prefs;
pub mod protocol;
pub mod relay;
pub mod room;
pub mod settings;

#[cfg(test)]
pub(crate) mod test_support;

pub use audio::{AcquiredCapture, AudioDeviceController, CaptureState};
pub use detector::{Levels, SpeechActivityDetector, Thresholds};
pub use events::{JoinOutcome, LeaveReason, VoiceEvent};
pub use identity::Identity;
pub use media::{AnalysisFrame, LocalTrack, MediaStream};
pub use peer::{LinkInfo, PeerSessionManager};
pub use ports::{
    AnalysisInput, AnalysisTap, AudioBackend, AudioSink, CaptureStream, ConnectionEvent,
    DevicePreferences, InboundSignal, LinkEventSender, Member, MembershipStore, PeerConnection,
    PeerConnector, Profile, SignalRelay,
};
pub use prefs::MemoryPreferences;
pub use protocol::{SignalEnvelope, VoiceSignal};
pub use relay::{RelayConfig, WebSocketSignalRelay};
pub use room::{Collaborators, JoinState, ParticipantView, RoomJoinCoordinator, Session};
pub use settings::{DetectorSettings, VoiceSettings};

pub use huddle_common::{ParticipantId, RoomId, VoiceError};
