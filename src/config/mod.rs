//! Configuration
//!
//! Layered configuration, lowest precedence first:
//! 1. Built-in defaults
//! 2. User config (`~/.config/ruleweave/config.toml`)
//! 3. Repo config (`.ruleweave/config.toml`)
//! 4. CLI overrides
//!
//! Layers are merged as JSON trees, then deserialized into `SyncConfig`.

mod defaults;
mod effective;
mod merge;
mod schema;

pub use defaults::BuiltinDefaults;
pub use effective::{repo_config_path, user_config_path, ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig};
pub use merge::{deep_merge, merge_layers};
pub use schema::{GitSettings, Mode, OverlaysConfig, SyncConfig, SyncSettings};
