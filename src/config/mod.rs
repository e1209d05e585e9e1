//! Settings module for the stackplate engine.
//!
//! This module handles all settings-related functionality:
//! - Parsing and deserializing `stackplate.yaml`
//! - Environment variable overrides and `.env` loading
//! - Validation of settings values

mod parser;
mod settings;

pub use parser::{
    DEFAULT_SETTINGS_FILES, ENV_ADDRESS_POLICY, ENV_ENABLE_TEMPLATING, ENV_FETCH_TIMEOUT_SECS,
    ENV_MAX_CONCURRENCY, ENV_STATE_DIR, SettingsParser, find_settings_file,
};
pub use settings::{AddressPolicy, Settings};
