//! Helpers for reading and mutating `Node` objects

use k8s_openapi::api::core::v1::Node;

/// OS image string reported by the kubelet (`status.nodeInfo.osImage`)
pub fn node_os_image(node: &Node) -> &str {
    node.status
        .as_ref()
        .and_then(|s| s.node_info.as_ref())
        .map(|info| info.os_image.as_str())
        .unwrap_or("")
}

pub fn node_has_label(node: &Node, key: &str) -> bool {
    node.metadata.labels.as_ref().is_some_and(|l| l.contains_key(key))
}

pub fn node_has_annotation(node: &Node, key: &str) -> bool {
    node.metadata.annotations.as_ref().is_some_and(|a| a.contains_key(key))
}

pub fn node_is_unschedulable(node: &Node) -> bool {
    node.spec.as_ref().and_then(|s| s.unschedulable).unwrap_or(false)
}

/// Adds a label with an empty value. Returns false if it was already set.
pub fn set_node_label(node: &mut Node, key: &str) -> bool {
    let labels = node.metadata.labels.get_or_insert_with(Default::default);
    labels.insert(key.to_string(), String::new()).is_none()
}

/// Removes a label. Returns false if it was not set.
pub fn remove_node_label(node: &mut Node, key: &str) -> bool {
    node.metadata.labels.as_mut().is_some_and(|l| l.remove(key).is_some())
}

pub fn set_node_annotation(node: &mut Node, key: &str, value: &str) {
    let annotations = node.metadata.annotations.get_or_insert_with(Default::default);
    annotations.insert(key.to_string(), value.to_string());
}

pub fn remove_node_annotation(node: &mut Node, key: &str) -> bool {
    node.metadata.annotations.as_mut().is_some_and(|a| a.remove(key).is_some())
}

pub fn set_node_unschedulable(node: &mut Node, unschedulable: bool) {
    let spec = node.spec.get_or_insert_with(Default::default);
    spec.unschedulable = Some(unschedulable);
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{NodeStatus, NodeSystemInfo};

    #[test]
    fn test_node_os_image() {
        let mut node = Node::default();
        assert_eq!(node_os_image(&node), "");
        node.status = Some(NodeStatus {
            node_info: Some(NodeSystemInfo {
                os_image: "FleetOS 1.0".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        });
        assert_eq!(node_os_image(&node), "FleetOS 1.0");
    }

    #[test]
    fn test_label_roundtrip() {
        let mut node = Node::default();
        assert!(set_node_label(&mut node, "x"));
        assert!(!set_node_label(&mut node, "x"));
        assert!(node_has_label(&node, "x"));
        assert!(remove_node_label(&mut node, "x"));
        assert!(!remove_node_label(&mut node, "x"));
    }

    #[test]
    fn test_unschedulable() {
        let mut node = Node::default();
        assert!(!node_is_unschedulable(&node));
        set_node_unschedulable(&mut node, true);
        assert!(node_is_unschedulable(&node));
    }
}
