use std::path::PathBuf;
use std::sync::Mutex;

use huddle_config::{save_config_to_path, HuddleConfig};
use huddle_voice::{DevicePreferences, VoiceError};
use tracing::{debug, warn};

/// Microphone preference stored in `[audio] input_device` of the config
/// file.
pub struct ConfigPreferences {
    path: PathBuf,
    config: Mutex<HuddleConfig>,
}

impl ConfigPreferences {
    pub fn new(path: PathBuf, config: HuddleConfig) -> Self {
        Self {
            path,
            config: Mutex::new(config),
        }
    }
}

impl DevicePreferences for ConfigPreferences {
    fn preferred_input(&self) -> Option<String> {
        self.config
            .lock()
            .ok()
            .and_then(|config| config.audio.input_device.clone())
    }

    fn store_input(&self, device_id: &str) -> Result<(), VoiceError> {
        let mut config = self
            .config
            .lock()
            .map_err(|_| VoiceError::DeviceUnavailable("preference store poisoned".into()))?;
        if config.audio.input_device.as_deref() == Some(device_id) {
            return Ok(());
        }
        config.audio.input_device = Some(device_id.to_string());
        save_config_to_path(&config, &self.path).map_err(|e| {
            warn!(path = %self.path.display(), error = %e, "Failed to persist input device");
            VoiceError::DeviceUnavailable(format!("failed to persist input device: {e}"))
        })?;
        debug!(device = device_id, path = %self.path.display(), "Input device persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_device_in_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let prefs = ConfigPreferences::new(path.clone(), HuddleConfig::default());
        assert!(prefs.preferred_input().is_none());

        prefs.store_input("usb-headset").unwrap();
        assert_eq!(prefs.preferred_input().as_deref(), Some("usb-headset"));

        let reloaded = huddle_config::load_config_from(&path).unwrap();
        assert_eq!(reloaded.audio.input_device.as_deref(), Some("usb-headset"));
    }

    #[test]
    fn unchanged_device_is_not_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = HuddleConfig::default();
        config.audio.input_device = Some("default".into());
        let prefs = ConfigPreferences::new(path.clone(), config);

        prefs.store_input("default").unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn unwritable_path_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();
        let prefs = ConfigPreferences::new(blocker.join("config.toml"), HuddleConfig::default());

        let err = prefs.store_input("usb").unwrap_err();
        assert!(matches!(err, VoiceError::DeviceUnavailable(_)));
    }
}
