//! Room membership configuration.

use serde::{Deserialize, Serialize};

/// Room membership limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Maximum participants in a room, the local participant included.
    pub max_participants: u32,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            max_participants: 8,
        }
    }
}
