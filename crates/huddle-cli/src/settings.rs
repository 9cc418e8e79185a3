//! Mapping from the on-disk configuration to runtime settings.

use std::time::Duration;

use huddle_config::HuddleConfig;
use huddle_voice::{DetectorSettings, RelayConfig, Thresholds, VoiceSettings};

pub fn voice_settings(config: &HuddleConfig) -> VoiceSettings {
    let detector = &config.detector;
    VoiceSettings {
        max_participants: config.room.max_participants as usize,
        start_muted: config.audio.start_muted,
        mic_gain: config.audio.mic_gain as f32,
        master_volume: config.audio.master_volume as f32,
        output_device: config.audio.output_device.clone(),
        detector: DetectorSettings {
            interval: Duration::from_millis(u64::from(detector.interval_ms)),
            thresholds: Thresholds {
                on_rms: detector.on_rms as f32,
                off_rms: detector.off_rms as f32,
                on_peak: detector.on_peak as f32,
                off_peak: detector.off_peak as f32,
            },
        },
    }
}

pub fn relay_config(config: &HuddleConfig) -> RelayConfig {
    let relay = &config.relay;
    RelayConfig {
        heartbeat_interval: Duration::from_secs(u64::from(relay.heartbeat_interval)),
        reconnect_delay: Duration::from_secs(u64::from(relay.reconnect_delay)),
        max_reconnect_delay: Duration::from_secs(u64::from(relay.max_reconnect_delay)),
        ..RelayConfig::new(relay.url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_runtime_defaults() {
        assert_eq!(voice_settings(&HuddleConfig::default()), VoiceSettings::default());
    }

    #[test]
    fn detector_section_is_applied() {
        let mut config = HuddleConfig::default();
        config.detector.interval_ms = 50;
        config.detector.on_peak = 0.5;
        config.audio.start_muted = true;
        config.room.max_participants = 4;

        let settings = voice_settings(&config);
        assert_eq!(settings.detector.interval, Duration::from_millis(50));
        assert_eq!(settings.detector.thresholds.on_peak, 0.5);
        assert!(settings.start_muted);
        assert_eq!(settings.max_participants, 4);
    }

    #[test]
    fn relay_section_is_applied() {
        let mut config = HuddleConfig::default();
        config.relay.url = "ws://localhost:4000/socket/websocket".into();
        config.relay.max_reconnect_delay = 10;

        let relay = relay_config(&config);
        assert_eq!(relay.url, "ws://localhost:4000/socket/websocket");
        assert_eq!(relay.heartbeat_interval, Duration::from_secs(25));
        assert_eq!(relay.max_reconnect_delay, Duration::from_secs(10));
        assert!(relay.access_token.is_none());
    }
}
