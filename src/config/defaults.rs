//! Built-in defaults (layer 1)

use serde::{Deserialize, Serialize};

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Operating mode (default: "solo")
    pub mode: String,

    /// Local rules path used when no sources are configured
    pub local_source_path: String,

    /// Export formats (default: agents-md)
    pub exporters: Vec<String>,

    /// Branch refs are rechecked after this many hours (default: 24)
    pub branch_check_interval_hours: u64,

    /// Tag refs are rechecked after this many hours (default: one week)
    pub tag_check_interval_hours: u64,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            mode: "solo".to_string(),
            local_source_path: ".ruleweave/rules".to_string(),
            exporters: vec!["agents-md".to_string()],
            branch_check_interval_hours: 24,
            tag_check_interval_hours: 24 * 7,
        }
    }
}

impl BuiltinDefaults {
    /// Convert to a JSON tree for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "mode": self.mode,
            "sources": [
                {"type": "local", "path": self.local_source_path}
            ],
            "exporters": self.exporters,
            "overlays": {
                "overrides": []
            },
            "git": {
                "branch_check_interval_hours": self.branch_check_interval_hours,
                "tag_check_interval_hours": self.tag_check_interval_hours,
                "offline": false
            },
            "sync": {
                "managed_sections": [],
                "allow_integrity_bypass": false
            }
        })
    }
}
