//! Configuration merge system
//!
//! Implements the 4-layer configuration merge:
//! 1. Built-in defaults
//! 2. User config (~/.kyper/config.toml)
//! 3. Environment (KYPER_HOST, KYPER_TOKEN)
//! 4. CLI flags

mod credentials;
mod defaults;
mod effective;
mod merge;

pub use credentials::{default_config_path, load_layer, save_token};
pub use defaults::{BuiltinDefaults, DEFAULT_HOST};
pub use effective::{
    CliOverrides, ClientConfig, ConfigError, ConfigOrigin, ConfigSource, OutputMode, PollSettings,
};
pub use merge::{deep_merge, env_layer, merge_layers, toml_to_json};
