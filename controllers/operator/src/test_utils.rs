//! Test utilities for the scheduler
//!
//! Builders for nodes and DesiredStates used across test modules.

use crds::{ConfigBundle, DesiredState, DesiredStateSpec, ExecutionMode, ImageKind, OperationKind};
use k8s_openapi::api::core::v1::{Node, NodeStatus, NodeSystemInfo};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Helper to create a node reporting `os_image` with the given labels
pub fn create_test_node(name: &str, os_image: &str, labels: &[(&str, &str)]) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()),
            ..Default::default()
        },
        status: Some(NodeStatus {
            node_info: Some(NodeSystemInfo {
                os_image: os_image.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Helper to create a parallel upgrade DesiredState
pub fn create_test_desired_state(name: &str, os_version: &str, max_unavailable: u32) -> DesiredState {
    DesiredState::new(
        name,
        DesiredStateSpec {
            os_version: os_version.to_string(),
            ops_type: OperationKind::Upgrade,
            image_type: ImageKind::RawDiskImage,
            image_url: Some("https://images.example.com/fleetos.img".to_string()),
            container_image: None,
            checksum: "abc123".to_string(),
            max_unavailable,
            node_selector: None,
            execution_mode: ExecutionMode::Parallel,
            time_window: None,
            time_interval: None,
            evict_pod_force: false,
            flag_safe: false,
            mtls: false,
            ca_cert: None,
            client_cert: None,
            client_key: None,
            sys_configs: None,
            upgrade_configs: None,
        },
    )
}

/// Empty bundle carrying only a version
pub fn bundle(version: &str) -> ConfigBundle {
    ConfigBundle {
        version: version.to_string(),
        configs: Vec::new(),
    }
}
