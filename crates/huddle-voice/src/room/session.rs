use std::collections::HashMap;

use huddle_common::{ParticipantId, RoomId};

/// Per-room client state. Exists from the start of a join until leave
/// completes.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub room_id: RoomId,
    /// Assigned by the membership store; `None` until registration.
    pub local_id: Option<ParticipantId>,
    pub muted: bool,
    pub speaker_muted: bool,
    pub mic_gain: f32,
    pub master_volume: f32,
    pub volume_overrides: HashMap<ParticipantId, f32>,
    pub input_device: Option<String>,
}

impl Session {
    pub fn new(room_id: RoomId, muted: bool) -> Self {
        Self {
            room_id,
            local_id: None,
            muted,
            speaker_muted: false,
            mic_gain: 1.0,
            master_volume: 1.0,
            volume_overrides: HashMap::new(),
            input_device: None,
        }
    }

    pub fn is_local(&self, participant: &ParticipantId) -> bool {
        self.local_id.as_ref() == Some(participant)
    }
}
