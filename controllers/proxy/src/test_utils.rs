//! Test utilities for the proxy reconciler

use crds::{
    ConfigBundle, ConfigEntry, ConfigOperation, ConfigUnit, DesiredState, DesiredStateSpec, ExecutionMode, ImageKind,
    OperationKind,
};
use k8s_openapi::api::core::v1::{Node, NodeStatus, NodeSystemInfo, Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};

/// Helper to create a node reporting `os_image` with the given labels
pub fn create_test_node(name: &str, os_image: &str, labels: &[&str]) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels.iter().map(|k| (k.to_string(), String::new())).collect()),
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

/// Helper to create a pod in `default` scheduled on `node_name`, optionally
/// controlled by an owner of kind `owner_kind`
pub fn create_test_pod(name: &str, node_name: &str, owner_kind: Option<&str>) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            owner_references: owner_kind.map(|kind| {
                vec![OwnerReference {
                    api_version: "apps/v1".to_string(),
                    kind: kind.to_string(),
                    name: format!("{}-owner", name),
                    uid: format!("{}-uid", name),
                    controller: Some(true),
                    ..Default::default()
                }]
            }),
            ..Default::default()
        },
        spec: Some(PodSpec {
            node_name: Some(node_name.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Helper to create an upgrade DesiredState
pub fn create_test_desired_state(name: &str, os_version: &str) -> DesiredState {
    DesiredState::new(
        name,
        DesiredStateSpec {
            os_version: os_version.to_string(),
            ops_type: OperationKind::Upgrade,
            image_type: ImageKind::RawDiskImage,
            image_url: Some("https://images.example.com/fleetos-2.0.img".to_string()),
            container_image: None,
            checksum: "abc123".to_string(),
            max_unavailable: 1,
            node_selector: None,
            execution_mode: ExecutionMode::Parallel,
            time_window: None,
            time_interval: None,
            evict_pod_force: false,
            flag_safe: false,
            mtls: false,
            ca_cert: Some("ca.pem".to_string()),
            client_cert: None,
            client_key: None,
            sys_configs: None,
            upgrade_configs: None,
        },
    )
}

/// Bundle with one unit of the given model setting `key=value`
pub fn bundle(version: &str, model: &str, key: &str, value: &str) -> ConfigBundle {
    ConfigBundle {
        version: version.to_string(),
        configs: vec![ConfigUnit {
            model: model.to_string(),
            config_path: None,
            contents: vec![ConfigEntry {
                key: key.to_string(),
                value: Some(value.to_string()),
                operation: ConfigOperation::Set,
            }],
        }],
    }
}
