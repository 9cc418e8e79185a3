use std::sync::Mutex;

use huddle_common::VoiceError;

use crate::ports::DevicePreferences;

/// Device preference that lives for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    input: Mutex<Option<String>>,
}

impl MemoryPreferences {
    pub fn new(initial: Option<String>) -> Self {
        Self {
            input: Mutex::new(initial),
        }
    }
}

impl DevicePreferences for MemoryPreferences {
    fn preferred_input(&self) -> Option<String> {
        self.input.lock().ok().and_then(|input| input.clone())
    }

    fn store_input(&self, device_id: &str) -> Result<(), VoiceError> {
        let mut input = self
            .input
            .lock()
            .map_err(|_| VoiceError::DeviceUnavailable("preference store poisoned".into()))?;
        *input = Some(device_id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remembers_last_stored_device() {
        let prefs = MemoryPreferences::default();
        assert_eq!(prefs.preferred_input(), None);
        prefs.store_input("usb-mic").unwrap();
        assert_eq!(prefs.preferred_input().as_deref(), Some("usb-mic"));
    }
}
