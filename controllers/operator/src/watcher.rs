//! Kubernetes resource watchers.
//!
//! DesiredStates are reconciled by a `kube_runtime::Controller`. A node
//! whose labels or OS image change can free budget for any rollout, so
//! such events fan out to every known DesiredState. Status heartbeats
//! leave both untouched and are dropped.

use crate::error::ControllerError;
use crate::reconciler::Scheduler;
use cluster_client::node_os_image;
use crds::DesiredState;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Node;
use kube::{Api, ResourceExt};
use kube_runtime::controller::{Action, Config as ControllerConfig};
use kube_runtime::reflector::{ObjectRef, Store};
use kube_runtime::{predicates, watcher, Controller};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info};

/// Quiet time after the last event before a pass starts
const DEBOUNCE: Duration = Duration::from_secs(2);

/// Remembers what the scheduler last saw of each node.
#[derive(Debug, Default)]
pub struct NodeChangeFilter {
    seen: Mutex<HashMap<String, u64>>,
}

impl NodeChangeFilter {
    /// True when the node's labels or OS image differ from the last call
    /// for the same node, or the node was never seen.
    pub fn changed(&self, node: &Node) -> bool {
        let mut hasher = DefaultHasher::new();
        predicates::labels(node).hash(&mut hasher);
        node_os_image(node).hash(&mut hasher);
        let fingerprint = hasher.finish();

        match self.seen.lock() {
            Ok(mut seen) => seen.insert(node.name_any(), fingerprint) != Some(fingerprint),
            Err(_poisoned) => true,
        }
    }
}

/// Every DesiredState currently in the controller's cache
fn all_desired_states(store: &Store<DesiredState>) -> Vec<ObjectRef<DesiredState>> {
    store.state().iter().map(|desired| ObjectRef::from_obj(desired.as_ref())).collect()
}

/// Watches DesiredStates and Nodes.
#[derive(Clone)]
pub struct Watcher {
    desired_state_api: Api<DesiredState>,
    node_api: Api<Node>,
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(desired_state_api: Api<DesiredState>, node_api: Api<Node>) -> Self {
        Self {
            desired_state_api,
            node_api,
        }
    }

    /// Runs the controller until its watches end. Passes run one at a time
    /// because the in-flight budget is shared by all rollouts.
    pub async fn run(&self, scheduler: Arc<Scheduler>) -> Result<(), ControllerError> {
        info!("Starting DesiredState controller");

        let controller = Controller::new(self.desired_state_api.clone(), watcher::Config::default());
        let store = controller.store();
        let filter = NodeChangeFilter::default();

        controller
            .watches(self.node_api.clone(), watcher::Config::default(), move |node: Node| {
                if filter.changed(&node) {
                    debug!("Node {} changed, rescheduling all DesiredStates", node.name_any());
                    all_desired_states(&store)
                } else {
                    Vec::new()
                }
            })
            .with_config(ControllerConfig::default().debounce(DEBOUNCE).concurrency(1))
            .run(reconcile, error_policy, scheduler)
            .for_each(|res| async move {
                match res {
                    Ok((desired, _)) => debug!("Reconciled DesiredState {}", desired.name),
                    Err(e) => error!("Controller error: {}", e),
                }
            })
            .await;

        Err(ControllerError::Watch("DesiredState controller stopped".to_string()))
    }
}

async fn reconcile(desired: Arc<DesiredState>, scheduler: Arc<Scheduler>) -> Result<Action, ControllerError> {
    scheduler.reconcile(&desired.name_any()).await
}

fn error_policy(desired: Arc<DesiredState>, error: &ControllerError, scheduler: Arc<Scheduler>) -> Action {
    scheduler.error_policy(&desired.name_any(), error)
}
