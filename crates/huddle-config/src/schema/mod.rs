//! Configuration schema types for huddle.
//!
//! All structs use `serde(default)` so partial configs work correctly.
//! Missing fields are filled with the defaults below.

mod audio;
mod detector;
mod logging;
mod relay;
mod room;

pub use audio::*;
pub use detector::*;
pub use logging::*;
pub use relay::*;
pub use room::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration for huddle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct HuddleConfig {
    pub room: RoomConfig,
    pub audio: AudioConfig,
    pub detector: DetectorConfig,
    pub relay: RelayConfig,
    pub logging: LoggingConfig,
}
