//! Validation for the room, audio, detector and relay sections.

use crate::schema::HuddleConfig;

use super::helpers::{validate_ordered, validate_range, validate_range_f64};

pub(crate) fn validate_room(errors: &mut Vec<String>, config: &HuddleConfig) {
    validate_range(
        errors,
        "room.max_participants",
        config.room.max_participants,
        2,
        32,
    );
}

pub(crate) fn validate_audio(errors: &mut Vec<String>, config: &HuddleConfig) {
    validate_range_f64(errors, "audio.mic_gain", config.audio.mic_gain, 0.0, 1.0);
    validate_range_f64(
        errors,
        "audio.master_volume",
        config.audio.master_volume,
        0.0,
        1.0,
    );
    if config.audio.input_device.as_deref() == Some("") {
        errors.push("audio.input_device must not be empty when set".into());
    }
}

/// Thresholds must be normalised and the start band must sit above the
/// stop band, otherwise the detector would flicker.
pub(crate) fn validate_detector(errors: &mut Vec<String>, config: &HuddleConfig) {
    let d = &config.detector;
    validate_range(errors, "detector.interval_ms", d.interval_ms, 16, 1000);
    validate_range_f64(errors, "detector.on_rms", d.on_rms, 0.0, 1.0);
    validate_range_f64(errors, "detector.off_rms", d.off_rms, 0.0, 1.0);
    validate_range_f64(errors, "detector.on_peak", d.on_peak, 0.0, 1.0);
    validate_range_f64(errors, "detector.off_peak", d.off_peak, 0.0, 1.0);
    validate_ordered(errors, "detector.on_rms", d.on_rms, "detector.off_rms", d.off_rms);
    validate_ordered(
        errors,
        "detector.on_peak",
        d.on_peak,
        "detector.off_peak",
        d.off_peak,
    );
}

pub(crate) fn validate_relay(errors: &mut Vec<String>, config: &HuddleConfig) {
    let r = &config.relay;
    if !(r.url.starts_with("ws://") || r.url.starts_with("wss://")) {
        errors.push(format!("relay.url = {} must be a ws:// or wss:// URL", r.url));
    }
    validate_range(
        errors,
        "relay.heartbeat_interval",
        r.heartbeat_interval,
        5,
        120,
    );
    validate_range(errors, "relay.reconnect_delay", r.reconnect_delay, 1, 60);
    if r.max_reconnect_delay < r.reconnect_delay {
        errors.push(format!(
            "relay.max_reconnect_delay = {} is below relay.reconnect_delay = {}",
            r.max_reconnect_delay, r.reconnect_delay
        ));
    }
}
