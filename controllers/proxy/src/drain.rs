//! Pod eviction before a destructive operation
//!
//! DaemonSet pods, static (mirror) pods and finished pods stay put. Pods
//! without a controlling owner are lost for good once evicted, so they are
//! only evicted when the rollout forces it; otherwise the drain fails before
//! anything is evicted.

use crate::error::ControllerError;
use cluster_client::ClusterClientTrait;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::{debug, info};

const MIRROR_POD_ANNOTATION: &str = "kubernetes.io/config.mirror";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PodDisposition {
    Skip,
    Evict,
    Unmanaged,
}

fn disposition(pod: &Pod) -> PodDisposition {
    if pod.annotations().contains_key(MIRROR_POD_ANNOTATION) {
        return PodDisposition::Skip;
    }
    let phase = pod.status.as_ref().and_then(|s| s.phase.as_deref());
    if matches!(phase, Some("Succeeded" | "Failed")) {
        return PodDisposition::Skip;
    }
    let controller = pod.owner_references().iter().find(|o| o.controller == Some(true));
    match controller {
        Some(owner) if owner.kind == "DaemonSet" => PodDisposition::Skip,
        Some(_) => PodDisposition::Evict,
        None => PodDisposition::Unmanaged,
    }
}

fn pod_key(pod: &Pod) -> String {
    format!("{}/{}", pod.namespace().unwrap_or_default(), pod.name_any())
}

/// Evicts the pods on `node_name`. Returns the evicted pods as `namespace/name`.
pub async fn drain_node(
    client: &dyn ClusterClientTrait,
    node_name: &str,
    force: bool,
) -> Result<Vec<String>, ControllerError> {
    let pods = client.list_pods_on_node(node_name).await?;

    let mut to_evict = Vec::new();
    let mut unmanaged = Vec::new();
    for pod in &pods {
        match disposition(pod) {
            PodDisposition::Skip => debug!("Leaving pod {} on node {}", pod_key(pod), node_name),
            PodDisposition::Evict => to_evict.push(pod),
            PodDisposition::Unmanaged if force => to_evict.push(pod),
            PodDisposition::Unmanaged => unmanaged.push(pod_key(pod)),
        }
    }
    if !unmanaged.is_empty() {
        return Err(ControllerError::Drain(format!(
            "pods not managed by a controller: {} (set evictPodForce to evict them)",
            unmanaged.join(", ")
        )));
    }

    let mut evicted = Vec::with_capacity(to_evict.len());
    for pod in to_evict {
        let namespace = pod.namespace().unwrap_or_default();
        client.evict_pod(&namespace, &pod.name_any()).await?;
        evicted.push(pod_key(pod));
    }
    info!("Evicted {} pods from node {}", evicted.len(), node_name);
    Ok(evicted)
}
