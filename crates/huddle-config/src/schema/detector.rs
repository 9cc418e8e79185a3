//! Speaking-detection configuration.

use serde::{Deserialize, Serialize};

/// Hysteresis thresholds and sampling rate for speech activity detection.
///
/// Amplitudes are RMS of normalised samples in `[-1, 1]`; peaks are the
/// largest normalised frequency-bin magnitude in `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Minimum interval between two sampling ticks.
    pub interval_ms: u32,
    pub on_rms: f64,
    pub off_rms: f64,
    pub on_peak: f64,
    pub off_peak: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            on_rms: 0.04,
            off_rms: 0.02,
            on_peak: 0.35,
            off_peak: 0.2,
        }
    }
}
