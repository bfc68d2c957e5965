//! Versioned configuration bundles
//!
//! A `ConfigBundle` is an ordered list of `ConfigUnit`s tagged with a version
//! string. Controllers only ever compare versions; the unit contents are
//! interpreted by the node agent.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Applier that targets the bootloader entry of the running partition
pub const GRUB_CMDLINE_CURRENT: &str = "grub.cmdline.current";

/// Applier that targets the bootloader entry of the standby partition
pub const GRUB_CMDLINE_NEXT: &str = "grub.cmdline.next";

/// A versioned, ordered set of configuration units
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConfigBundle {
    /// Bundle version; equality with the applied version means converged
    #[serde(default)]
    pub version: String,

    /// Units applied in order
    #[serde(default)]
    pub configs: Vec<ConfigUnit>,
}

/// One unit of configuration handled by a single applier
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigUnit {
    /// Applier kind (e.g. "kernel.sysctl", "kernel.sysctl.persist", "grub.cmdline")
    pub model: String,

    /// Target file for appliers that persist to disk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,

    /// Key/value entries
    #[serde(default)]
    pub contents: Vec<ConfigEntry>,
}

/// A single key with its value and operation
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigEntry {
    pub key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(default)]
    pub operation: ConfigOperation,
}

/// Operation applied to a key
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOperation {
    #[default]
    Set,
    Delete,
}

impl ConfigBundle {
    /// Exchanges the current/next grub applier names.
    ///
    /// After an A/B switch the partition that was "next" becomes "current",
    /// so bundles assigned as part of an upgrade are rewritten with the roles
    /// inverted. Any other model name is left alone.
    pub fn swap_grub_cmdline_roles(&mut self) {
        for unit in &mut self.configs {
            if unit.model == GRUB_CMDLINE_CURRENT {
                unit.model = GRUB_CMDLINE_NEXT.to_string();
            } else if unit.model == GRUB_CMDLINE_NEXT {
                unit.model = GRUB_CMDLINE_CURRENT.to_string();
            }
        }
    }

    /// Returns a copy with grub roles exchanged.
    #[must_use]
    pub fn with_swapped_grub_cmdline_roles(&self) -> Self {
        let mut swapped = self.clone();
        swapped.swap_grub_cmdline_roles();
        swapped
    }
}

/// Version of an optional bundle; a missing bundle has the empty version.
pub fn bundle_version(bundle: Option<&ConfigBundle>) -> &str {
    bundle.map(|b| b.version.as_str()).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(model: &str) -> ConfigUnit {
        ConfigUnit {
            model: model.to_string(),
            config_path: None,
            contents: vec![ConfigEntry {
                key: "panic".to_string(),
                value: Some("5".to_string()),
                operation: ConfigOperation::Set,
            }],
        }
    }

    #[test]
    fn test_swap_grub_cmdline_roles() {
        let mut bundle = ConfigBundle {
            version: "v2".to_string(),
            configs: vec![
                unit(GRUB_CMDLINE_CURRENT),
                unit("kernel.sysctl"),
                unit(GRUB_CMDLINE_NEXT),
            ],
        };

        bundle.swap_grub_cmdline_roles();

        assert_eq!(bundle.configs[0].model, GRUB_CMDLINE_NEXT);
        assert_eq!(bundle.configs[1].model, "kernel.sysctl");
        assert_eq!(bundle.configs[2].model, GRUB_CMDLINE_CURRENT);
        assert_eq!(bundle.version, "v2");
    }

    #[test]
    fn test_swap_leaves_plain_grub_cmdline() {
        let bundle = ConfigBundle {
            version: "v1".to_string(),
            configs: vec![unit("grub.cmdline")],
        };
        assert_eq!(bundle.with_swapped_grub_cmdline_roles(), bundle);
    }

    #[test]
    fn test_bundle_version_missing_is_empty() {
        assert_eq!(bundle_version(None), "");
        let bundle = ConfigBundle { version: "v3".to_string(), configs: vec![] };
        assert_eq!(bundle_version(Some(&bundle)), "v3");
    }

    #[test]
    fn test_operation_defaults_to_set() {
        let entry: ConfigEntry = serde_json::from_str(r#"{"key":"a","value":"1"}"#).unwrap();
        assert_eq!(entry.operation, ConfigOperation::Set);
        let entry: ConfigEntry = serde_json::from_str(r#"{"key":"a","operation":"delete"}"#).unwrap();
        assert_eq!(entry.operation, ConfigOperation::Delete);
    }
}
