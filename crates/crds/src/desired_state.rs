//! DesiredState CRD
//!
//! Declares the target OS version, image, configuration bundles and rollout
//! policy for a fleet of nodes.

use crate::config::{bundle_version, ConfigBundle};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "upgrade.fleetos.io",
    version = "v1alpha1",
    kind = "DesiredState",
    plural = "desiredstates",
    shortname = "dst"
)]
#[serde(rename_all = "camelCase")]
pub struct DesiredStateSpec {
    /// Target OS version, compared against the node's reported OS image
    pub os_version: String,

    /// Operation carried out by this rollout
    #[serde(default)]
    pub ops_type: OperationKind,

    /// How the agent acquires the image
    #[serde(default)]
    pub image_type: ImageKind,

    /// Download location for raw disk images
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    /// Image reference for registry/container pulls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_image: Option<String>,

    /// Expected sha256 digest of the image (hex)
    #[serde(default)]
    pub checksum: String,

    /// Maximum number of nodes in flight at once
    #[serde(default = "default_max_unavailable")]
    pub max_unavailable: u32,

    /// Value of the node-selector label targeted by this rollout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<String>,

    /// Rollout pacing
    #[serde(default)]
    pub execution_mode: ExecutionMode,

    /// Window outside of which no new node is dispatched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_window: Option<TimeWindow>,

    /// Seconds to wait before the next batch once a batch is full
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_interval: Option<u64>,

    /// Evict pods that are not managed by a controller
    #[serde(default)]
    pub evict_pod_force: bool,

    /// Allow image download over plain HTTP
    #[serde(default)]
    pub flag_safe: bool,

    /// Present a client certificate when downloading
    #[serde(default)]
    pub mtls: bool,

    /// CA certificate file name under the agent trust directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<String>,

    /// Client certificate file name under the agent trust directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_cert: Option<String>,

    /// Client key file name under the agent trust directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_key: Option<String>,

    /// Configuration applied to the running system
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sys_configs: Option<ConfigBundle>,

    /// Configuration applied before switching partitions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upgrade_configs: Option<ConfigBundle>,
}

fn default_max_unavailable() -> u32 {
    1
}

/// Rollout operation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    #[default]
    Upgrade,
    Config,
    Rollback,
    /// Any value this version does not know; passes are skipped
    #[serde(other)]
    Unknown,
}

/// Image acquisition strategy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ImageKind {
    /// Pulled through containerd from a registry
    #[serde(alias = "containerd")]
    RegistryImage,

    /// Pulled through the docker daemon
    #[serde(alias = "docker")]
    ContainerImage,

    /// Raw root filesystem downloaded over HTTP(S)
    #[default]
    #[serde(alias = "disk")]
    RawDiskImage,
}

/// Rollout pacing
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Serial,
    #[default]
    Parallel,
}

/// Dispatch window, either daily (`HH:MM:SS`) or absolute (`YYYY-MM-DD HH:MM:SS`)
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimeWindow {
    #[serde(default)]
    pub start_time: String,

    #[serde(default)]
    pub end_time: String,
}

impl DesiredStateSpec {
    pub fn sys_config_version(&self) -> &str {
        bundle_version(self.sys_configs.as_ref())
    }

    pub fn upgrade_config_version(&self) -> &str {
        bundle_version(self.upgrade_configs.as_ref())
    }
}
