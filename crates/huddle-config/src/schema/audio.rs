//! Capture and playback configuration.

use serde::{Deserialize, Serialize};

/// Audio device and volume preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Preferred capture device id. Rewritten whenever a device is
    /// successfully acquired.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_device: Option<String>,
    /// Output sink id handed to the platform renderer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_device: Option<String>,
    pub mic_gain: f64,
    pub master_volume: f64,
    pub start_muted: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_device: None,
            output_device: None,
            mic_gain: 1.0,
            master_volume: 1.0,
            start_muted: false,
        }
    }
}
