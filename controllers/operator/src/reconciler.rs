//! Batch scheduling of nodes for a DesiredState.
//!
//! One pass claims at most `budget` nodes by labeling them:
//!
//! - `budget = min(maxUnavailable, nodeNum) - inFlight`, with
//!   `maxUnavailable` forced to 1 in serial mode
//! - `nodeNum` counts non-control-plane nodes
//! - `inFlight` counts nodes already labeled upgrading or configuring
//!
//! Candidates are listed in store order (at most `budget + 1`) and only
//! nodes that actually differ from the target are claimed. A claim that
//! loses an optimistic-concurrency race is skipped; the next pass retries.

use crate::error::ControllerError;
use crate::time_window::is_within_time_window;
use cluster_client::{
    for_node_selector, node_os_image, set_node_label, ClusterClientTrait, ClusterError, Expression,
    Selector,
};
use crds::{
    DesiredState, ExecutionMode, OperationKind, LABEL_CONFIGURING, LABEL_CONTROL_PLANE, LABEL_MASTER,
    LABEL_UPGRADING,
};
use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use probes::Metrics;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const CONTROLLER_NAME: &str = "operator";

/// Result of one scheduling pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PassOutcome {
    /// Nodes labeled during this pass
    pub dispatched: u32,
    /// Whether the in-flight budget is used up
    pub limit_reached: bool,
}

/// Schedules nodes for DesiredStates.
pub struct Scheduler {
    client: Arc<dyn ClusterClientTrait>,
    metrics: Metrics,
    period: Duration,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler").field("period", &self.period).finish_non_exhaustive()
    }
}

fn control_plane_excluded() -> Selector {
    [
        Expression::DoesNotExist(LABEL_MASTER.to_string()),
        Expression::DoesNotExist(LABEL_CONTROL_PLANE.to_string()),
    ]
    .into_iter()
    .collect()
}

fn claim_label(ops: OperationKind) -> Option<&'static str> {
    match ops {
        OperationKind::Upgrade | OperationKind::Rollback => Some(LABEL_UPGRADING),
        OperationKind::Config => Some(LABEL_CONFIGURING),
        OperationKind::Unknown => None,
    }
}

impl Scheduler {
    pub fn new(client: Arc<dyn ClusterClientTrait>, metrics: Metrics, period: Duration) -> Self {
        Self { client, metrics, period }
    }

    /// Reconciles one DesiredState and decides when to look at it again.
    pub async fn reconcile(&self, name: &str) -> Result<Action, ControllerError> {
        let result = self.reconcile_desired_state(name).await;
        self.metrics.record_reconcile(CONTROLLER_NAME, result.is_ok());
        result
    }

    /// Failed passes are retried on the fixed period, without backoff growth.
    pub fn error_policy(&self, name: &str, error: &ControllerError) -> Action {
        error!("Failed to reconcile DesiredState {}: {}", name, error);
        Action::requeue(self.period)
    }

    async fn reconcile_desired_state(&self, name: &str) -> Result<Action, ControllerError> {
        let desired = match self.client.get_desired_state(name).await {
            Ok(desired) => desired,
            Err(e) if e.is_not_found() => {
                info!("DesiredState {} no longer exists", name);
                return Ok(Action::await_change());
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(window) = &desired.spec.time_window {
            if !is_within_time_window(&window.start_time, &window.end_time)? {
                debug!(
                    "DesiredState {} outside window {} - {}, skipping",
                    name, window.start_time, window.end_time
                );
                return Ok(Action::requeue(self.period));
            }
        }

        let outcome = self.schedule(&desired).await?;
        self.metrics.record_dispatched(u64::from(outcome.dispatched));
        if outcome.limit_reached {
            let interval = desired.spec.time_interval.map_or(self.period, Duration::from_secs);
            Ok(Action::requeue(interval))
        } else {
            Ok(Action::requeue(self.period))
        }
    }

    /// Runs one scheduling pass for `desired`.
    pub async fn schedule(&self, desired: &DesiredState) -> Result<PassOutcome, ControllerError> {
        let name = desired.name_any();
        let spec = &desired.spec;
        let Some(label) = claim_label(spec.ops_type) else {
            warn!("DesiredState {} has an unknown opsType, skipping pass", name);
            return Ok(PassOutcome::default());
        };

        let node_num = self.count_nodes(&control_plane_excluded()).await?;
        let in_flight = self.count_in_flight().await?;

        let max_unavailable = match spec.execution_mode {
            ExecutionMode::Serial => 1,
            ExecutionMode::Parallel => spec.max_unavailable,
        };
        let cap = max_unavailable.min(node_num);
        let budget = cap.saturating_sub(in_flight);
        info!(
            "Scheduling DesiredState {} ({:?}): nodes={}, in-flight={}, budget={}",
            name, spec.ops_type, node_num, in_flight, budget
        );
        if budget == 0 {
            return Ok(PassOutcome {
                dispatched: 0,
                limit_reached: true,
            });
        }

        let mut selector = control_plane_excluded();
        selector.extend([
            Expression::DoesNotExist(LABEL_UPGRADING.to_string()),
            Expression::DoesNotExist(LABEL_CONFIGURING.to_string()),
        ]);
        selector.extend(for_node_selector(spec.node_selector.as_deref()));
        let candidates = self.client.list_nodes(&selector, Some(budget + 1)).await?;

        let mut dispatched = 0;
        for node in candidates {
            if dispatched >= budget {
                break;
            }
            if !self.needs_work(desired, &node).await? {
                continue;
            }
            if self.claim(node, label).await? {
                dispatched += 1;
            }
        }

        Ok(PassOutcome {
            dispatched,
            limit_reached: dispatched >= budget,
        })
    }

    async fn count_nodes(&self, selector: &Selector) -> Result<u32, ControllerError> {
        let nodes = self.client.list_nodes(selector, None).await?;
        Ok(u32::try_from(nodes.len()).unwrap_or(u32::MAX))
    }

    async fn count_in_flight(&self) -> Result<u32, ControllerError> {
        let mut in_flight = 0;
        for label in [LABEL_UPGRADING, LABEL_CONFIGURING] {
            let mut selector = control_plane_excluded();
            selector.extend([Expression::Exists(label.to_string())]);
            in_flight += self.count_nodes(&selector).await?;
        }
        Ok(in_flight)
    }

    async fn needs_work(&self, desired: &DesiredState, node: &Node) -> Result<bool, ControllerError> {
        let node_name = node.name_any();
        match desired.spec.ops_type {
            OperationKind::Upgrade | OperationKind::Rollback => Ok(node_os_image(node) != desired.spec.os_version),
            OperationKind::Config => match self.client.get_machine_status(&node_name).await {
                Ok(status) => Ok(status.assigned_sys_version() != desired.spec.sys_config_version()),
                Err(e) if e.is_not_found() => {
                    debug!("Node {} has no MachineStatus yet, skipping", node_name);
                    Ok(false)
                }
                Err(e) => Err(e.into()),
            },
            OperationKind::Unknown => Ok(false),
        }
    }

    /// Labels a node. Returns false when another writer got there first.
    async fn claim(&self, mut node: Node, label: &str) -> Result<bool, ControllerError> {
        let node_name = node.name_any();
        set_node_label(&mut node, label);
        match self.client.replace_node(&node).await {
            Ok(_) => {
                info!("Labeled node {} with {}", node_name, label);
                Ok(true)
            }
            Err(ClusterError::Conflict(msg)) => {
                warn!("Conflict labeling node {}, retrying next pass: {}", node_name, msg);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
#[path = "reconciler_test.rs"]
mod tests;
