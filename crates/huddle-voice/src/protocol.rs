//! Wire types for peer signaling.
//!
//! Signals are opaque to the coordination layer: they are produced by the
//! connection primitive on one side and handed verbatim to the primitive on
//! the other. The relay wraps them in a [`SignalEnvelope`] addressed to a
//! single participant and broadcasts it on the room topic.

use serde::{Deserialize, Serialize};

use huddle_common::{ParticipantId, RoomId};

// ---------------------------------------------------------------------------
// Broadcast event names
// ---------------------------------------------------------------------------

pub mod events {
    pub const VOICE_SIGNAL: &str = "voice_signal";
}

/// Relay topic carrying the signals of one room.
pub fn room_topic(room: &RoomId) -> String {
    format!("voice:{room}")
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

/// Negotiation messages exchanged between two connection primitives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VoiceSignal {
    /// Session description offer from the initiating side.
    Offer { sdp: String },
    /// Session description answer from the responding side.
    Answer { sdp: String },
    /// Connectivity candidate, sent by either side.
    IceCandidate {
        candidate: String,
        sdp_mid: Option<String>,
        sdp_m_line_index: Option<u32>,
    },
}

impl VoiceSignal {
    pub fn kind(&self) -> &'static str {
        match self {
            VoiceSignal::Offer { .. } => "offer",
            VoiceSignal::Answer { .. } => "answer",
            VoiceSignal::IceCandidate { .. } => "ice_candidate",
        }
    }
}

/// A signal addressed from one participant to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalEnvelope {
    pub from: ParticipantId,
    pub to: ParticipantId,
    pub signal: VoiceSignal,
}

impl SignalEnvelope {
    pub fn is_for(&self, participant: &ParticipantId) -> bool {
        &self.to == participant
    }
}
