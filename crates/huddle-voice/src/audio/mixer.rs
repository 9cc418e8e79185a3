use std::collections::HashMap;

use huddle_common::ParticipantId;

/// Clamps a gain or volume to [0, 1]. NaN becomes silence.
pub fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Master volume, per-participant overrides and speaker mute.
///
/// Effective volume for a participant is `master * override`, or zero
/// while the speaker is muted. Overrides default to 1.
#[derive(Debug, Clone)]
pub struct VolumeMixer {
    master: f32,
    overrides: HashMap<ParticipantId, f32>,
    speaker_muted: bool,
}

impl Default for VolumeMixer {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl VolumeMixer {
    pub fn new(master: f32) -> Self {
        Self {
            master: clamp_unit(master),
            overrides: HashMap::new(),
            speaker_muted: false,
        }
    }

    pub fn master(&self) -> f32 {
        self.master
    }

    /// Returns the value actually stored.
    pub fn set_master(&mut self, volume: f32) -> f32 {
        self.master = clamp_unit(volume);
        self.master
    }

    pub fn participant(&self, id: &ParticipantId) -> f32 {
        self.overrides.get(id).copied().unwrap_or(1.0)
    }

    pub fn set_participant(&mut self, id: &ParticipantId, volume: f32) -> f32 {
        let volume = clamp_unit(volume);
        self.overrides.insert(id.clone(), volume);
        volume
    }

    pub fn clear_overrides(&mut self) {
        self.overrides.clear();
    }

    pub fn speaker_muted(&self) -> bool {
        self.speaker_muted
    }

    pub fn set_speaker_muted(&mut self, muted: bool) {
        self.speaker_muted = muted;
    }

    pub fn effective(&self, id: &ParticipantId) -> f32 {
        if self.speaker_muted {
            0.0
        } else {
            self.master * self.participant(id)
        }
    }
}
