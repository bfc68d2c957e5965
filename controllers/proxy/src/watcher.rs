//! Kubernetes resource watchers.
//!
//! The proxy runs a `kube_runtime::Controller` over its own Node. Changes to
//! its MachineStatus and to any DesiredState map back onto that Node, so
//! every event ends in the same full pass.

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crds::{DesiredState, MachineStatus};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Node;
use kube::Api;
use kube_runtime::controller::{Action, Config as ControllerConfig};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{watcher, Controller};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Quiet time after the last event before a pass starts
const DEBOUNCE: Duration = Duration::from_secs(1);

/// Watches the resources relevant to one node.
#[derive(Clone)]
pub struct Watcher {
    node_name: String,
    desired_state_api: Api<DesiredState>,
    node_api: Api<Node>,
    machine_status_api: Api<MachineStatus>,
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(
        node_name: String,
        desired_state_api: Api<DesiredState>,
        node_api: Api<Node>,
        machine_status_api: Api<MachineStatus>,
    ) -> Self {
        Self {
            node_name,
            desired_state_api,
            node_api,
            machine_status_api,
        }
    }

    fn own_object(&self) -> watcher::Config {
        watcher::Config::default().fields(&format!("metadata.name={}", self.node_name))
    }

    /// Runs the controller until its watches end.
    pub async fn run(&self, reconciler: Arc<Reconciler>) -> Result<(), ControllerError> {
        info!("Starting controller for node {}", self.node_name);

        let node_ref = ObjectRef::<Node>::new(&self.node_name);
        let for_status = node_ref.clone();
        let for_desired = node_ref;

        Controller::new(self.node_api.clone(), self.own_object())
            .watches(self.machine_status_api.clone(), self.own_object(), move |_status: MachineStatus| {
                Some(for_status.clone())
            })
            .watches(
                self.desired_state_api.clone(),
                watcher::Config::default(),
                move |_desired: DesiredState| Some(for_desired.clone()),
            )
            .with_config(ControllerConfig::default().debounce(DEBOUNCE).concurrency(1))
            .run(reconcile, error_policy, reconciler)
            .for_each(|res| async move {
                match res {
                    Ok((node, _)) => debug!("Reconciled {}", node.name),
                    Err(e) => error!("Controller error: {}", e),
                }
            })
            .await;

        Err(ControllerError::Watch("node controller stopped".to_string()))
    }
}

async fn reconcile(_node: Arc<Node>, reconciler: Arc<Reconciler>) -> Result<Action, ControllerError> {
    reconciler.reconcile_node().await
}

fn error_policy(_node: Arc<Node>, error: &ControllerError, reconciler: Arc<Reconciler>) -> Action {
    reconciler.error_policy(error)
}
