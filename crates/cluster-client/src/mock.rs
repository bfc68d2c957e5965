//! Mock ClusterClient for unit testing
//!
//! Stores objects in memory, hands out monotonically increasing
//! `resourceVersion`s and rejects stale writes with `ClusterError::Conflict`,
//! so reconcilers can be exercised against the same optimistic-concurrency
//! rules as the real API server. Nodes are listed in name order.

use crate::cluster_trait::ClusterClientTrait;
use crate::error::ClusterError;
use crate::selector::{selector_matches, Selector};
use crds::{DesiredState, MachineStatus};
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::ResourceExt;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

/// Mock ClusterClient for testing
#[derive(Clone, Default)]
pub struct MockClusterClient {
    desired_states: Arc<Mutex<BTreeMap<String, DesiredState>>>,
    nodes: Arc<Mutex<BTreeMap<String, Node>>>,
    machine_statuses: Arc<Mutex<BTreeMap<String, MachineStatus>>>,
    pods: Arc<Mutex<Vec<Pod>>>,
    evicted: Arc<Mutex<Vec<String>>>,
    node_conflicts: Arc<Mutex<HashSet<String>>>,
    fail_lists: Arc<Mutex<bool>>,
    fail_evictions: Arc<Mutex<bool>>,
    next_version: Arc<Mutex<u64>>,
}

impl MockClusterClient {
    /// Create an empty mock store
    pub fn new() -> Self {
        Self::default()
    }

    fn next_version(&self) -> String {
        let mut version = self.next_version.lock().unwrap();
        *version += 1;
        version.to_string()
    }

    /// Add a DesiredState (for test setup)
    pub fn add_desired_state(&self, mut desired: DesiredState) {
        desired.metadata.resource_version = Some(self.next_version());
        self.desired_states.lock().unwrap().insert(desired.name_any(), desired);
    }

    /// Remove a DesiredState (for test setup)
    pub fn remove_desired_state(&self, name: &str) {
        self.desired_states.lock().unwrap().remove(name);
    }

    /// Add a node (for test setup)
    pub fn add_node(&self, mut node: Node) {
        node.metadata.resource_version = Some(self.next_version());
        self.nodes.lock().unwrap().insert(node.name_any(), node);
    }

    /// Add a MachineStatus (for test setup)
    pub fn add_machine_status(&self, mut status: MachineStatus) {
        status.metadata.resource_version = Some(self.next_version());
        self.machine_statuses.lock().unwrap().insert(status.name_any(), status);
    }

    /// Add a pod (for test setup)
    pub fn add_pod(&self, pod: Pod) {
        self.pods.lock().unwrap().push(pod);
    }

    /// Current copy of a node
    pub fn node(&self, name: &str) -> Option<Node> {
        self.nodes.lock().unwrap().get(name).cloned()
    }

    /// Current copy of a MachineStatus
    pub fn machine_status(&self, name: &str) -> Option<MachineStatus> {
        self.machine_statuses.lock().unwrap().get(name).cloned()
    }

    /// Pods evicted so far, as `namespace/name`
    pub fn evicted_pods(&self) -> Vec<String> {
        self.evicted.lock().unwrap().clone()
    }

    /// Simulate a competing writer: the next update of this node conflicts
    pub fn conflict_next_node_update(&self, name: &str) {
        self.node_conflicts.lock().unwrap().insert(name.to_string());
    }

    /// Make every list call fail
    pub fn set_fail_lists(&self, fail: bool) {
        *self.fail_lists.lock().unwrap() = fail;
    }

    /// Make every eviction fail
    pub fn set_fail_evictions(&self, fail: bool) {
        *self.fail_evictions.lock().unwrap() = fail;
    }

    fn check_lists(&self) -> Result<(), ClusterError> {
        if *self.fail_lists.lock().unwrap() {
            return Err(ClusterError::InvalidObject("injected list failure".to_string()));
        }
        Ok(())
    }

    fn check_version(stored: Option<&String>, incoming: Option<&String>, what: &str) -> Result<(), ClusterError> {
        match (stored, incoming) {
            (Some(stored), Some(incoming)) if stored != incoming => {
                Err(ClusterError::Conflict(format!("{} was modified", what)))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl ClusterClientTrait for MockClusterClient {
    async fn get_desired_state(&self, name: &str) -> Result<DesiredState, ClusterError> {
        self.desired_states
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| ClusterError::NotFound(format!("DesiredState {}", name)))
    }

    async fn list_desired_states(&self) -> Result<Vec<DesiredState>, ClusterError> {
        self.check_lists()?;
        Ok(self.desired_states.lock().unwrap().values().cloned().collect())
    }

    async fn get_node(&self, name: &str) -> Result<Node, ClusterError> {
        self.nodes
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| ClusterError::NotFound(format!("Node {}", name)))
    }

    async fn list_nodes(&self, selector: &Selector, limit: Option<u32>) -> Result<Vec<Node>, ClusterError> {
        self.check_lists()?;
        let nodes = self.nodes.lock().unwrap();
        let matching = nodes
            .values()
            .filter(|n| selector_matches(selector, n.metadata.labels.as_ref()))
            .cloned();
        Ok(match limit {
            Some(limit) => matching.take(limit as usize).collect(),
            None => matching.collect(),
        })
    }

    async fn replace_node(&self, node: &Node) -> Result<Node, ClusterError> {
        let name = node.name_any();
        if self.node_conflicts.lock().unwrap().remove(&name) {
            return Err(ClusterError::Conflict(format!("Node {} was modified", name)));
        }
        let version = self.next_version();
        let mut nodes = self.nodes.lock().unwrap();
        let stored = nodes
            .get(&name)
            .ok_or_else(|| ClusterError::NotFound(format!("Node {}", name)))?;
        Self::check_version(
            stored.metadata.resource_version.as_ref(),
            node.metadata.resource_version.as_ref(),
            &format!("Node {}", name),
        )?;
        let mut updated = node.clone();
        updated.metadata.resource_version = Some(version);
        nodes.insert(name, updated.clone());
        Ok(updated)
    }

    async fn get_machine_status(&self, name: &str) -> Result<MachineStatus, ClusterError> {
        self.machine_statuses
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| ClusterError::NotFound(format!("MachineStatus {}", name)))
    }

    async fn create_machine_status(&self, status: &MachineStatus) -> Result<MachineStatus, ClusterError> {
        let name = status.name_any();
        let version = self.next_version();
        let mut statuses = self.machine_statuses.lock().unwrap();
        if statuses.contains_key(&name) {
            return Err(ClusterError::Conflict(format!("MachineStatus {} already exists", name)));
        }
        let mut created = status.clone();
        created.metadata.resource_version = Some(version);
        statuses.insert(name, created.clone());
        Ok(created)
    }

    async fn replace_machine_status(&self, status: &MachineStatus) -> Result<MachineStatus, ClusterError> {
        let name = status.name_any();
        let version = self.next_version();
        let mut statuses = self.machine_statuses.lock().unwrap();
        let stored = statuses
            .get(&name)
            .ok_or_else(|| ClusterError::NotFound(format!("MachineStatus {}", name)))?;
        Self::check_version(
            stored.metadata.resource_version.as_ref(),
            status.metadata.resource_version.as_ref(),
            &format!("MachineStatus {}", name),
        )?;
        // spec writes never touch the status subresource
        let mut updated = status.clone();
        updated.status = stored.status.clone();
        updated.metadata.resource_version = Some(version);
        statuses.insert(name, updated.clone());
        Ok(updated)
    }

    async fn replace_machine_status_status(&self, status: &MachineStatus) -> Result<MachineStatus, ClusterError> {
        let name = status.name_any();
        let version = self.next_version();
        let mut statuses = self.machine_statuses.lock().unwrap();
        let stored = statuses
            .get(&name)
            .ok_or_else(|| ClusterError::NotFound(format!("MachineStatus {}", name)))?;
        Self::check_version(
            stored.metadata.resource_version.as_ref(),
            status.metadata.resource_version.as_ref(),
            &format!("MachineStatus {}", name),
        )?;
        let mut updated = stored.clone();
        updated.status = status.status.clone();
        updated.metadata.resource_version = Some(version);
        statuses.insert(name, updated.clone());
        Ok(updated)
    }

    async fn list_pods_on_node(&self, node_name: &str) -> Result<Vec<Pod>, ClusterError> {
        self.check_lists()?;
        Ok(self
            .pods
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.spec.as_ref().and_then(|s| s.node_name.as_deref()) == Some(node_name))
            .cloned()
            .collect())
    }

    async fn evict_pod(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        if *self.fail_evictions.lock().unwrap() {
            return Err(ClusterError::InvalidObject(format!(
                "eviction of {}/{} blocked by disruption budget",
                namespace, name
            )));
        }
        self.pods
            .lock()
            .unwrap()
            .retain(|p| !(p.namespace().as_deref() == Some(namespace) && p.name_any() == name));
        self.evicted.lock().unwrap().push(format!("{}/{}", namespace, name));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn node(name: &str) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_stale_node_write_conflicts() {
        let mock = MockClusterClient::new();
        mock.add_node(node("n1"));

        let first = mock.get_node("n1").await.unwrap();
        let second = mock.get_node("n1").await.unwrap();

        mock.replace_node(&first).await.unwrap();
        let err = mock.replace_node(&second).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_list_nodes_respects_limit_and_order() {
        let mock = MockClusterClient::new();
        for name in ["c", "a", "b"] {
            mock.add_node(node(name));
        }
        let nodes = mock.list_nodes(&Selector::default(), Some(2)).await.unwrap();
        let names: Vec<_> = nodes.iter().map(|n| n.name_any()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_list_nodes_applies_selector() {
        let mock = MockClusterClient::new();
        let mut edge = node("edge-0");
        edge.metadata.labels = Some(BTreeMap::from([("role".to_string(), "edge".to_string())]));
        mock.add_node(edge);
        mock.add_node(node("core-0"));

        let selector = Selector::from(crate::selector::Expression::Equal("role".to_string(), "edge".to_string()));
        let nodes = mock.list_nodes(&selector, None).await.unwrap();
        let names: Vec<_> = nodes.iter().map(|n| n.name_any()).collect();
        assert_eq!(names, vec!["edge-0"]);
    }
}
