use std::time::Duration;

use crate::detector::Thresholds;

/// Speaking detector cadence and thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSettings {
    pub interval: Duration,
    pub thresholds: Thresholds,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            thresholds: Thresholds::default(),
        }
    }
}

/// Runtime settings of a voice client, usually built from the config file.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceSettings {
    pub max_participants: usize,
    pub start_muted: bool,
    pub mic_gain: f32,
    pub master_volume: f32,
    /// Render device for remote audio. `None` uses the system default.
    pub output_device: Option<String>,
    pub detector: DetectorSettings,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            max_participants: 8,
            start_muted: false,
            mic_gain: 1.0,
            master_volume: 1.0,
            output_device: None,
            detector: DetectorSettings::default(),
        }
    }
}
