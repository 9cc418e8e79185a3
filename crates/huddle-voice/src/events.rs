use std::fmt;

use serde::{Deserialize, Serialize};

use huddle_common::{ParticipantId, RoomId, VoiceError};

/// Why the local participant left a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveReason {
    User,
    /// The membership store dropped our registration.
    RemovedRemotely,
    Shutdown,
}

impl fmt::Display for LeaveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LeaveReason::User => "user",
            LeaveReason::RemovedRemotely => "removed_remotely",
            LeaveReason::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}

/// Result of a join request that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined(ParticipantId),
    /// Another join or leave was in flight, or a session already exists.
    AlreadyActive,
}

/// Notifications for the UI layer.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceEvent {
    Joined {
        room_id: RoomId,
        participant_id: ParticipantId,
    },
    JoinFailed {
        room_id: RoomId,
        error: VoiceError,
    },
    Left {
        room_id: RoomId,
        reason: LeaveReason,
    },
    PeerConnected {
        participant_id: ParticipantId,
        initiator: bool,
    },
    PeerStreamStarted {
        participant_id: ParticipantId,
    },
    /// A link was torn down. `error` is set when the connection failed
    /// rather than closed.
    PeerDisconnected {
        participant_id: ParticipantId,
        error: Option<String>,
    },
    SpeakingChanged {
        participant_id: ParticipantId,
        speaking: bool,
    },
    MuteChanged {
        muted: bool,
    },
    SpeakerMuteChanged {
        muted: bool,
    },
    /// `participant_id` is `None` for the master volume.
    VolumeChanged {
        participant_id: Option<ParticipantId>,
        volume: f32,
    },
    MicGainChanged {
        gain: f32,
    },
    DeviceSwitched {
        device_id: String,
    },
    Error(String),
}
