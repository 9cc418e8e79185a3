//! Microphone capture, render sinks and volume control.

mod controller;
mod mixer;

pub use controller::{AcquiredCapture, AudioDeviceController, CaptureState, OutboundTrackTarget};
pub use mixer::{clamp_unit, VolumeMixer};

#[cfg(test)]
mod tests;
