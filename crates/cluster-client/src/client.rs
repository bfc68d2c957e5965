//! Kubernetes-backed cluster client
//!
//! Implements `ClusterClientTrait` on top of `kube::Api`. DesiredState and
//! MachineStatus are cluster-scoped; pods are evicted through the eviction
//! subresource so PodDisruptionBudgets are honoured.

use crate::cluster_trait::ClusterClientTrait;
use crate::error::ClusterError;
use crate::selector::Selector;
use crds::{DesiredState, MachineStatus};
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{EvictParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client};
use tracing::debug;

/// Resource store client backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
    desired_state_api: Api<DesiredState>,
    machine_status_api: Api<MachineStatus>,
    node_api: Api<Node>,
}

impl KubeClusterClient {
    /// Create a cluster client from an existing kube client
    pub fn new(client: Client) -> Self {
        Self {
            desired_state_api: Api::all(client.clone()),
            machine_status_api: Api::all(client.clone()),
            node_api: Api::all(client.clone()),
            client,
        }
    }

    /// Create a cluster client from the in-cluster or kubeconfig environment
    pub async fn try_default() -> Result<Self, ClusterError> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }

    /// Underlying kube client, used by watchers
    pub fn kube_client(&self) -> Client {
        self.client.clone()
    }
}

fn object_name<'a>(name: Option<&'a String>, kind: &str) -> Result<&'a str, ClusterError> {
    name.map(String::as_str)
        .ok_or_else(|| ClusterError::InvalidObject(format!("{} missing name", kind)))
}

#[async_trait::async_trait]
impl ClusterClientTrait for KubeClusterClient {
    async fn get_desired_state(&self, name: &str) -> Result<DesiredState, ClusterError> {
        self.desired_state_api
            .get(name)
            .await
            .map_err(|e| ClusterError::from_kube(e, &format!("DesiredState {}", name)))
    }

    async fn list_desired_states(&self) -> Result<Vec<DesiredState>, ClusterError> {
        let list = self.desired_state_api.list(&ListParams::default()).await?;
        Ok(list.items)
    }

    async fn get_node(&self, name: &str) -> Result<Node, ClusterError> {
        self.node_api
            .get(name)
            .await
            .map_err(|e| ClusterError::from_kube(e, &format!("Node {}", name)))
    }

    async fn list_nodes(&self, selector: &Selector, limit: Option<u32>) -> Result<Vec<Node>, ClusterError> {
        let mut params = ListParams::default().labels_from(selector);
        if let Some(limit) = limit {
            params = params.limit(limit);
        }
        debug!("Listing nodes with selector '{}' limit {:?}", selector, limit);
        let list = self.node_api.list(&params).await?;
        Ok(list.items)
    }

    async fn replace_node(&self, node: &Node) -> Result<Node, ClusterError> {
        let name = object_name(node.metadata.name.as_ref(), "Node")?;
        self.node_api
            .replace(name, &PostParams::default(), node)
            .await
            .map_err(|e| ClusterError::from_kube(e, &format!("Node {}", name)))
    }

    async fn get_machine_status(&self, name: &str) -> Result<MachineStatus, ClusterError> {
        self.machine_status_api
            .get(name)
            .await
            .map_err(|e| ClusterError::from_kube(e, &format!("MachineStatus {}", name)))
    }

    async fn create_machine_status(&self, status: &MachineStatus) -> Result<MachineStatus, ClusterError> {
        let name = object_name(status.metadata.name.as_ref(), "MachineStatus")?;
        self.machine_status_api
            .create(&PostParams::default(), status)
            .await
            .map_err(|e| ClusterError::from_kube(e, &format!("MachineStatus {}", name)))
    }

    async fn replace_machine_status(&self, status: &MachineStatus) -> Result<MachineStatus, ClusterError> {
        let name = object_name(status.metadata.name.as_ref(), "MachineStatus")?;
        self.machine_status_api
            .replace(name, &PostParams::default(), status)
            .await
            .map_err(|e| ClusterError::from_kube(e, &format!("MachineStatus {}", name)))
    }

    async fn replace_machine_status_status(&self, status: &MachineStatus) -> Result<MachineStatus, ClusterError> {
        let name = object_name(status.metadata.name.as_ref(), "MachineStatus")?;
        // resourceVersion in a merge patch acts as a precondition
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": status.metadata.resource_version },
            "status": status.status,
        });
        self.machine_status_api
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| ClusterError::from_kube(e, &format!("MachineStatus {} status", name)))
    }

    async fn list_pods_on_node(&self, node_name: &str) -> Result<Vec<Pod>, ClusterError> {
        let pod_api: Api<Pod> = Api::all(self.client.clone());
        let params = ListParams::default().fields(&format!("spec.nodeName={}", node_name));
        let list = pod_api.list(&params).await?;
        Ok(list.items)
    }

    async fn evict_pod(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        let pod_api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        match pod_api.evict(name, &EvictParams::default()).await {
            Ok(_) => Ok(()),
            Err(e) => match ClusterError::from_kube(e, &format!("Pod {}/{}", namespace, name)) {
                // already gone
                ClusterError::NotFound(_) => Ok(()),
                other => Err(other),
            },
        }
    }
}
