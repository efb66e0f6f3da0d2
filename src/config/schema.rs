//! Typed view of the merged configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::effective::ConfigError;
use crate::export::KNOWN_FORMATS;
use crate::overlay::Overlay;
use crate::source::SourceSpec;

/// Operating mode. Stricter modes turn warnings into failures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Solo,
    Team,
    Enterprise,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Solo => "solo",
            Mode::Team => "team",
            Mode::Enterprise => "enterprise",
        }
    }

    /// Integrity failures abort the sync unless explicitly bypassed.
    pub fn integrity_is_fatal(&self) -> bool {
        !matches!(self, Mode::Solo)
    }

    /// A lockfile is written after each successful sync.
    pub fn writes_lockfile(&self) -> bool {
        !matches!(self, Mode::Solo)
    }

    /// Document-backed sources must declare owner, source and integrity.
    pub fn requires_provenance(&self) -> bool {
        matches!(self, Mode::Enterprise)
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverlaysConfig {
    #[serde(default)]
    pub overrides: Vec<Overlay>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitSettings {
    /// Cache root; falls back to the platform cache directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    #[serde(default = "default_branch_interval")]
    pub branch_check_interval_hours: u64,

    #[serde(default = "default_tag_interval")]
    pub tag_check_interval_hours: u64,

    /// Never touch the network; serve everything from cache
    #[serde(default)]
    pub offline: bool,
}

fn default_branch_interval() -> u64 {
    24
}

fn default_tag_interval() -> u64 {
    24 * 7
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            cache_dir: None,
            branch_check_interval_hours: default_branch_interval(),
            tag_check_interval_hours: default_tag_interval(),
            offline: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Headings of sections the team manages; edits to these are flagged
    #[serde(default)]
    pub managed_sections: Vec<String>,

    #[serde(default)]
    pub allow_integrity_bypass: bool,
}

/// Fully merged, typed configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub mode: Mode,

    pub sources: Vec<SourceSpec>,

    pub exporters: Vec<String>,

    #[serde(default)]
    pub overlays: OverlaysConfig,

    #[serde(default)]
    pub git: GitSettings,

    #[serde(default)]
    pub sync: SyncSettings,
}

impl SyncConfig {
    /// Parse from a merged JSON tree and validate.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        let config: SyncConfig = serde_json::from_value(value)
            .map_err(|e| ConfigError::ValidationError(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sources.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one source must be configured".to_string(),
            ));
        }
        for source in &self.sources {
            source
                .validate()
                .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        }

        if self.exporters.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one exporter must be configured".to_string(),
            ));
        }
        for exporter in &self.exporters {
            if !KNOWN_FORMATS.contains(&exporter.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "unknown exporter '{}' (expected one of: {})",
                    exporter,
                    KNOWN_FORMATS.join(", ")
                )));
            }
        }

        for overlay in &self.overlays.overrides {
            ruleweave_selector::parse_selector(&overlay.selector)
                .map_err(|e| ConfigError::ValidationError(format!("overlay: {}", e)))?;
        }

        if self.git.branch_check_interval_hours == 0 || self.git.tag_check_interval_hours == 0 {
            return Err(ConfigError::ValidationError(
                "git check intervals must be at least one hour".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> serde_json::Value {
        json!({
            "mode": "team",
            "sources": [{"type": "local", "path": "rules.md"}],
            "exporters": ["agents-md", "cursor"]
        })
    }

    #[test]
    fn test_parse_minimal() {
        let config = SyncConfig::from_value(base()).unwrap();
        assert_eq!(config.mode, Mode::Team);
        assert_eq!(config.git.branch_check_interval_hours, 24);
        assert_eq!(config.git.tag_check_interval_hours, 168);
        assert!(config.overlays.overrides.is_empty());
    }

    #[test]
    fn test_unknown_exporter_rejected() {
        let mut value = base();
        value["exporters"] = json!(["word-doc"]);
        let err = SyncConfig::from_value(value).unwrap_err();
        assert!(err.to_string().contains("word-doc"));
    }

    #[test]
    fn test_bad_overlay_selector_rejected() {
        let mut value = base();
        value["overlays"] = json!({"overrides": [{"selector": "rule[id=", "set": {"a": 1}}]});
        assert!(SyncConfig::from_value(value).is_err());
    }

    #[test]
    fn test_empty_sources_rejected() {
        let mut value = base();
        value["sources"] = json!([]);
        assert!(SyncConfig::from_value(value).is_err());
    }

    #[test]
    fn test_mode_policy() {
        assert!(!Mode::Solo.integrity_is_fatal());
        assert!(Mode::Team.writes_lockfile());
        assert!(!Mode::Team.requires_provenance());
        assert!(Mode::Enterprise.requires_provenance());
    }
}
