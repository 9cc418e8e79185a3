//! huddle configuration system.
//!
//! TOML-based configuration with full validation. All sections use
//! sensible defaults so partial configs work out of the box.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use huddle_config::{load_config, config_to_json};
//!
//! let config = load_config().expect("failed to load config");
//! println!("{}", config_to_json(&config));
//! ```

pub mod schema;
pub mod toml_loader;
pub mod toml_writer;
pub mod validation;

pub use schema::{
    AudioConfig, DetectorConfig, HuddleConfig, LogLevel, LoggingConfig, RelayConfig, RoomConfig,
    CONFIG_SCHEMA_VERSION,
};
pub use toml_writer::{save_config, save_config_to_path};

use huddle_common::ConfigError;
use std::path::Path;

/// Load config from the platform default path and validate it.
///
/// Creates a documented default file if none exists.
pub fn load_config() -> Result<HuddleConfig, ConfigError> {
    let config = toml_loader::load_default()?;
    validation::validate(&config)?;
    Ok(config)
}

/// Load config from an explicit path (creating it if missing) and validate it.
pub fn load_config_from(path: &Path) -> Result<HuddleConfig, ConfigError> {
    let config = toml_loader::load_or_create(path)?;
    validation::validate(&config)?;
    Ok(config)
}

/// Serialize a config to a pretty-printed JSON string.
pub fn config_to_json(config: &HuddleConfig) -> String {
    serde_json::to_string_pretty(config)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize config: {e}\"}}"))
}
