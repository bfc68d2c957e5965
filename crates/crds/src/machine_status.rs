//! MachineStatus CRD
//!
//! One object per node, named after the node. The spec holds the assigned
//! configuration and node status; the status subresource holds what the node
//! has actually applied.

use crate::config::{bundle_version, ConfigBundle};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "upgrade.fleetos.io",
    version = "v1alpha1",
    kind = "MachineStatus",
    plural = "machinestatuses",
    shortname = "mst",
    status = "AppliedConfigs"
)]
#[serde(rename_all = "camelCase")]
pub struct MachineStatusSpec {
    /// What the node is currently doing
    #[serde(default)]
    pub node_status: NodeStatus,

    /// Assigned system configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sys_configs: Option<ConfigBundle>,

    /// Assigned upgrade configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upgrade_configs: Option<ConfigBundle>,
}

/// Configuration the node has acknowledged as applied
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppliedConfigs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sys_configs: Option<ConfigBundle>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upgrade_configs: Option<ConfigBundle>,
}

/// Node activity
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum NodeStatus {
    #[default]
    Idle,
    Upgrading,
    RollingBack,
    Configuring,
}

impl MachineStatus {
    /// Creates an idle MachineStatus for a node with empty bundles.
    pub fn for_node(node_name: &str) -> Self {
        let mut status = MachineStatus::new(node_name, MachineStatusSpec::default());
        status.status = Some(AppliedConfigs::default());
        status
    }

    pub fn node_status(&self) -> NodeStatus {
        self.spec.node_status
    }

    pub fn assigned_sys_version(&self) -> &str {
        bundle_version(self.spec.sys_configs.as_ref())
    }

    pub fn assigned_upgrade_version(&self) -> &str {
        bundle_version(self.spec.upgrade_configs.as_ref())
    }

    pub fn applied_sys_version(&self) -> &str {
        bundle_version(self.status.as_ref().and_then(|s| s.sys_configs.as_ref()))
    }

    pub fn applied_upgrade_version(&self) -> &str {
        bundle_version(self.status.as_ref().and_then(|s| s.upgrade_configs.as_ref()))
    }
}
