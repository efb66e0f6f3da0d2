//! Effective configuration with provenance
//!
//! Captures the merged configuration plus where each layer came from,
//! so verbose runs can log which files shaped the result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

use super::defaults::BuiltinDefaults;
use super::merge::merge_layers;
use super::schema::SyncConfig;

/// Schema identifier
pub const SCHEMA_ID: &str = "ruleweave/effective_config@1";

/// Repo config location, relative to the repository root
pub const REPO_CONFIG_RELATIVE: &str = ".ruleweave/config.toml";

/// Origin of a configuration layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    User,
    Repo,
    Cli,
}

/// A contributing config layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    /// File path (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 of the raw file bytes (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub schema_id: String,

    pub created_at: DateTime<Utc>,

    /// The merged configuration tree
    pub config: Value,

    /// Typed view of `config`
    #[serde(skip)]
    pub settings: Option<SyncConfig>,

    /// Contributing layers in precedence order
    pub sources: Vec<ConfigSource>,
}

/// `~/.config/ruleweave/config.toml`, honoring `XDG_CONFIG_HOME`
pub fn user_config_path() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(dir).join("ruleweave").join("config.toml"));
    }
    std::env::var_os("HOME")
        .filter(|v| !v.is_empty())
        .map(|home| {
            PathBuf::from(home)
                .join(".config")
                .join("ruleweave")
                .join("config.toml")
        })
}

pub fn repo_config_path(repo_root: &Path) -> PathBuf {
    repo_root.join(REPO_CONFIG_RELATIVE)
}

impl EffectiveConfig {
    /// Build the effective config from layers. Missing files are skipped.
    pub fn build(
        user_config_path: Option<&Path>,
        repo_config_path: Option<&Path>,
        cli_overrides: Option<Value>,
    ) -> Result<Self, ConfigError> {
        let mut layers = Vec::new();
        let mut sources = Vec::new();

        layers.push(BuiltinDefaults::default().to_value());
        sources.push(ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        });

        for (origin, path) in [
            (ConfigOrigin::User, user_config_path),
            (ConfigOrigin::Repo, repo_config_path),
        ] {
            let Some(path) = path else { continue };
            if !path.exists() {
                continue;
            }
            let (value, digest) = load_toml_file(path)?;
            log::debug!("loaded {:?} config from {}", origin, path.display());
            layers.push(value);
            sources.push(ConfigSource {
                origin,
                path: Some(path.to_string_lossy().to_string()),
                digest: Some(digest),
            });
        }

        if let Some(cli) = cli_overrides {
            layers.push(cli);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
                digest: None,
            });
        }

        let merged = merge_layers(layers);
        let settings = SyncConfig::from_value(merged.clone())?;

        Ok(Self {
            schema_id: SCHEMA_ID.to_string(),
            created_at: Utc::now(),
            config: merged,
            settings: Some(settings),
            sources,
        })
    }

    /// Typed configuration.
    pub fn typed(&self) -> Result<SyncConfig, ConfigError> {
        match &self.settings {
            Some(settings) => Ok(settings.clone()),
            None => SyncConfig::from_value(self.config.clone()),
        }
    }
}

/// Load and parse a TOML file, returning the value and digest of its bytes
fn load_toml_file(path: &Path) -> Result<(Value, String), ConfigError> {
    let bytes = fs::read(path)
        .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;

    let digest = hex::encode(Sha256::digest(&bytes));

    let contents = String::from_utf8(bytes)
        .map_err(|e| ConfigError::ParseError(format!("{}: invalid UTF-8: {}", path.display(), e)))?;

    let toml_value: toml::Value = toml::from_str(&contents)
        .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;

    Ok((toml_to_json(toml_value), digest))
}

fn toml_to_json(toml: toml::Value) -> Value {
    match toml {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(arr) => Value::Array(arr.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Mode;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_build_with_defaults_only() {
        let config = EffectiveConfig::build(None, None, None).unwrap();

        assert_eq!(config.config["mode"], "solo");
        let typed = config.typed().unwrap();
        assert_eq!(typed.exporters, vec!["agents-md".to_string()]);
        assert_eq!(typed.sources.len(), 1);
    }

    #[test]
    fn test_cli_override_wins() {
        let cli = serde_json::json!({"mode": "team", "git": {"offline": true}});
        let config = EffectiveConfig::build(None, None, Some(cli)).unwrap();

        let typed = config.typed().unwrap();
        assert_eq!(typed.mode, Mode::Team);
        assert!(typed.git.offline);
        assert_eq!(typed.git.branch_check_interval_hours, 24);
    }

    #[test]
    fn test_invalid_mode_rejected() {
        let cli = serde_json::json!({"mode": "galaxy"});
        let result = EffectiveConfig::build(None, None, Some(cli));
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_repo_toml_layer() {
        let mut temp = NamedTempFile::new().unwrap();
        writeln!(temp, "mode = \"enterprise\"").unwrap();
        writeln!(temp, "exporters = [\"cursor\", \"claude-md\"]").unwrap();
        writeln!(temp, "[[sources]]").unwrap();
        writeln!(temp, "type = \"git\"").unwrap();
        writeln!(temp, "url = \"https://example.com/rules.git\"").unwrap();
        writeln!(temp, "ref = \"v1.2.0\"").unwrap();

        let config = EffectiveConfig::build(None, Some(temp.path()), None).unwrap();
        let typed = config.typed().unwrap();

        assert_eq!(typed.mode, Mode::Enterprise);
        assert_eq!(typed.exporters.len(), 2);
        assert_eq!(typed.sources.len(), 1);
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[1].origin, ConfigOrigin::Repo);
        assert_eq!(config.sources[1].digest.as_ref().map(|d| d.len()), Some(64));
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let mut temp = NamedTempFile::new().unwrap();
        writeln!(temp, "mode = ").unwrap();

        let result = EffectiveConfig::build(Some(temp.path()), None, None);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_missing_file_skipped() {
        let config =
            EffectiveConfig::build(Some(Path::new("/nonexistent/ruleweave.toml")), None, None)
                .unwrap();
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources[0].origin, ConfigOrigin::Builtin);
    }
}
