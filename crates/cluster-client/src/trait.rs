//! ClusterClient trait for mocking
//!
//! This trait abstracts the resource store so reconcilers can be unit tested.
//! The concrete `KubeClusterClient` implements it against the Kubernetes API,
//! and tests use `MockClusterClient`.

use crate::error::ClusterError;
use crate::selector::Selector;
use crds::{DesiredState, MachineStatus};
use k8s_openapi::api::core::v1::{Node, Pod};

/// Trait for resource store operations
///
/// Updates carry the object's `resourceVersion`; a stale write fails with
/// `ClusterError::Conflict` and the caller retries on its next pass.
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ClusterClientTrait: Send + Sync {
    // DesiredState
    async fn get_desired_state(&self, name: &str) -> Result<DesiredState, ClusterError>;
    async fn list_desired_states(&self) -> Result<Vec<DesiredState>, ClusterError>;

    // Nodes
    async fn get_node(&self, name: &str) -> Result<Node, ClusterError>;
    async fn list_nodes(&self, selector: &Selector, limit: Option<u32>) -> Result<Vec<Node>, ClusterError>;
    async fn replace_node(&self, node: &Node) -> Result<Node, ClusterError>;

    // MachineStatus
    async fn get_machine_status(&self, name: &str) -> Result<MachineStatus, ClusterError>;
    async fn create_machine_status(&self, status: &MachineStatus) -> Result<MachineStatus, ClusterError>;
    async fn replace_machine_status(&self, status: &MachineStatus) -> Result<MachineStatus, ClusterError>;
    async fn replace_machine_status_status(&self, status: &MachineStatus) -> Result<MachineStatus, ClusterError>;

    // Pods
    async fn list_pods_on_node(&self, node_name: &str) -> Result<Vec<Pod>, ClusterError>;
    async fn evict_pod(&self, namespace: &str, name: &str) -> Result<(), ClusterError>;
}
