//! Tests for the full validation pipeline.

use super::*;
use crate::schema::*;

#[test]
fn default_config_validates() {
    let config = HuddleConfig::default();
    assert!(validate(&config).is_ok());
}

#[test]
fn catches_room_too_small() {
    let mut config = HuddleConfig::default();
    config.room.max_participants = 1;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("room.max_participants"));
}

#[test]
fn catches_gain_over_one() {
    let mut config = HuddleConfig::default();
    config.audio.mic_gain = 1.5;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("audio.mic_gain"));
}

#[test]
fn catches_negative_master_volume() {
    let mut config = HuddleConfig::default();
    config.audio.master_volume = -0.1;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("audio.master_volume"));
}

#[test]
fn catches_nan_gain() {
    let mut config = HuddleConfig::default();
    config.audio.mic_gain = f64::NAN;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("audio.mic_gain"));
}

#[test]
fn catches_empty_input_device() {
    let mut config = HuddleConfig::default();
    config.audio.input_device = Some(String::new());
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("audio.input_device"));
}

#[test]
fn catches_inverted_rms_band() {
    let mut config = HuddleConfig::default();
    config.detector.on_rms = 0.01;
    config.detector.off_rms = 0.02;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("detector.on_rms"));
    assert!(err.contains("must be greater than"));
}

#[test]
fn catches_equal_peak_band() {
    let mut config = HuddleConfig::default();
    config.detector.on_peak = 0.3;
    config.detector.off_peak = 0.3;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("detector.on_peak"));
}

#[test]
fn catches_interval_too_fast() {
    let mut config = HuddleConfig::default();
    config.detector.interval_ms = 5;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("detector.interval_ms"));
}

#[test]
fn catches_non_websocket_relay_url() {
    let mut config = HuddleConfig::default();
    config.relay.url = "https://relay.example".into();
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("relay.url"));
}

#[test]
fn catches_backoff_cap_below_base() {
    let mut config = HuddleConfig::default();
    config.relay.reconnect_delay = 10;
    config.relay.max_reconnect_delay = 5;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("relay.max_reconnect_delay"));
}

#[test]
fn collects_multiple_errors() {
    let mut config = HuddleConfig::default();
    config.room.max_participants = 0;
    config.audio.master_volume = 3.0;
    config.detector.interval_ms = 0;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("room.max_participants"));
    assert!(err.contains("audio.master_volume"));
    assert!(err.contains("detector.interval_ms"));
    assert_eq!(err.matches("; ").count(), 2);
}
