//! Per-node reconciliation.
//!
//! Every pass re-reads the node, its MachineStatus and the DesiredState that
//! targets the node, then takes the first step that applies:
//!
//! - upgrade/rollback, OS version matches: apply a pending SysConfig, then
//!   release the `upgrading` claim and uncordon
//! - upgrade/rollback, claimed: record the assignment, pre-apply the
//!   UpgradeConfig, cordon, drain, call the agent
//! - config, claimed: copy the SysConfig into the MachineStatus spec, call
//!   the agent, record it as applied and release the `configuring` claim
//!
//! A claim whose work went away (the DesiredState was deleted, stopped
//! targeting the node, or switched between config and upgrade) is dropped:
//! the label is removed, NodeStatus goes back to idle and our cordon is
//! undone.
//!
//! Apart from the last dispatch, nothing is remembered between passes; a
//! failed step leaves the claim in place and the next pass picks it up
//! again.

use crate::convert::{configure_request, update_request};
use crate::drain::drain_node;
use crate::error::ControllerError;
use agent_client::AgentClientTrait;
use cluster_client::{
    for_node_selector, node_has_label, node_is_unschedulable, node_os_image, remove_node_annotation,
    remove_node_label, selector_matches, set_node_annotation, set_node_unschedulable, ClusterClientTrait,
    Selector,
};
use crds::{
    ConfigBundle, DesiredState, MachineStatus, NodeStatus, OperationKind, ANNOTATION_CORDONED_BY_PROXY,
    LABEL_CONFIGURING, LABEL_UPGRADING,
};
use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use probes::Metrics;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

const CONTROLLER_NAME: &str = "proxy";

/// What a pass ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassAction {
    /// No DesiredState targets this node, or the node is not claimed
    Idle,
    /// Update or Rollback was handed to the agent
    Dispatched,
    /// Update or Rollback already went out; waiting for the reboot
    AwaitingReboot,
    /// Work finished or went away and the claim was released
    Released,
}

/// Last Update or Rollback handed to the agent
#[derive(Debug, Clone)]
struct Dispatch {
    target: String,
    at: Instant,
}

/// Reconciles the node this proxy runs on.
pub struct Reconciler {
    client: Arc<dyn ClusterClientTrait>,
    agent: Arc<dyn AgentClientTrait>,
    node_name: String,
    metrics: Metrics,
    period: Duration,
    last_dispatch: Mutex<Option<Dispatch>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler").field("node_name", &self.node_name).finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(
        client: Arc<dyn ClusterClientTrait>,
        agent: Arc<dyn AgentClientTrait>,
        node_name: String,
        metrics: Metrics,
        period: Duration,
    ) -> Self {
        Self {
            client,
            agent,
            node_name,
            metrics,
            period,
            last_dispatch: Mutex::new(None),
        }
    }

    /// Runs one pass on behalf of the `kube_runtime` Controller.
    pub async fn reconcile_node(&self) -> Result<Action, ControllerError> {
        let result = self.reconcile().await;
        self.metrics.record_reconcile(CONTROLLER_NAME, result.is_ok());
        let action = result?;
        debug!("Pass on node {} ended {:?}", self.node_name, action);
        Ok(Action::requeue(self.period))
    }

    /// Requeue policy after a failed pass. Transient failures only warn.
    pub fn error_policy(&self, error: &ControllerError) -> Action {
        if error.is_transient() {
            warn!("Pass on node {} will be retried: {}", self.node_name, error);
        } else {
            error!("Pass on node {} failed: {}", self.node_name, error);
        }
        Action::requeue(self.period)
    }

    pub async fn reconcile(&self) -> Result<PassAction, ControllerError> {
        let node = self.client.get_node(&self.node_name).await?;
        let status = self.ensure_machine_status().await?;

        let Some(desired) = self.select_desired_state(&node).await? else {
            debug!("No DesiredState targets node {}", self.node_name);
            return self.drop_claims(node, status, &[LABEL_UPGRADING, LABEL_CONFIGURING]).await;
        };
        debug!("Reconciling node {} against DesiredState {}", self.node_name, desired.name_any());

        let stale = match desired.spec.ops_type {
            OperationKind::Upgrade | OperationKind::Rollback => Some(LABEL_CONFIGURING),
            OperationKind::Config => Some(LABEL_UPGRADING),
            OperationKind::Unknown => None,
        };
        if let Some(label) = stale.filter(|label| node_has_label(&node, label)) {
            info!(
                "Node {} holds a {} claim that DesiredState {} no longer asks for",
                self.node_name,
                label,
                desired.name_any()
            );
            return self.drop_claims(node, status, &[label]).await;
        }

        match desired.spec.ops_type {
            OperationKind::Upgrade | OperationKind::Rollback => self.reconcile_upgrade(&desired, node, status).await,
            OperationKind::Config => self.reconcile_config(&desired, node, status).await,
            OperationKind::Unknown => {
                warn!("DesiredState {} has an unknown opsType, ignoring", desired.name_any());
                Ok(PassAction::Idle)
            }
        }
    }

    async fn ensure_machine_status(&self) -> Result<MachineStatus, ControllerError> {
        match self.client.get_machine_status(&self.node_name).await {
            Ok(status) => Ok(status),
            Err(e) if e.is_not_found() => {
                info!("Creating MachineStatus for node {}", self.node_name);
                Ok(self
                    .client
                    .create_machine_status(&MachineStatus::for_node(&self.node_name))
                    .await?)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// First DesiredState, by name, whose node selector matches this node
    async fn select_desired_state(&self, node: &Node) -> Result<Option<DesiredState>, ControllerError> {
        let mut matching: Vec<DesiredState> = self
            .client
            .list_desired_states()
            .await?
            .into_iter()
            .filter(|desired| {
                let selector: Selector = for_node_selector(desired.spec.node_selector.as_deref()).into_iter().collect();
                selector_matches(&selector, node.metadata.labels.as_ref())
            })
            .collect();
        matching.sort_by_key(ResourceExt::name_any);
        if matching.len() > 1 {
            warn!(
                "{} DesiredStates target node {}, using {}",
                matching.len(),
                self.node_name,
                matching[0].name_any()
            );
        }
        Ok(matching.into_iter().next())
    }

    async fn reconcile_upgrade(
        &self,
        desired: &DesiredState,
        node: Node,
        status: MachineStatus,
    ) -> Result<PassAction, ControllerError> {
        let claimed = node_has_label(&node, LABEL_UPGRADING);

        if node_os_image(&node) == desired.spec.os_version {
            if !claimed {
                if matches!(status.node_status(), NodeStatus::Upgrading | NodeStatus::RollingBack) {
                    self.set_node_status(status, NodeStatus::Idle).await?;
                }
                self.release(node, &[]).await?;
                return Ok(PassAction::Idle);
            }
            info!("Node {} runs {}", self.node_name, desired.spec.os_version);
            let status = self.apply_pending_sys_config(desired, status).await?;
            self.set_node_status(status, NodeStatus::Idle).await?;
            self.release(node, &[LABEL_UPGRADING]).await?;
            return Ok(PassAction::Released);
        }

        if !claimed {
            self.release(node, &[]).await?;
            return Ok(PassAction::Idle);
        }

        if self.awaiting_reboot(&desired.spec.os_version).await {
            debug!("Node {} is rebooting into {}", self.node_name, desired.spec.os_version);
            return Ok(PassAction::AwaitingReboot);
        }

        let rollback = desired.spec.ops_type == OperationKind::Rollback;
        let mut status = status;
        let mut changed = false;
        let node_status = if rollback { NodeStatus::RollingBack } else { NodeStatus::Upgrading };
        if status.spec.node_status != node_status {
            status.spec.node_status = node_status;
            changed = true;
        }
        // partition roles flip on reboot, so the bundle is stored from the
        // point of view of the new boot
        let sys_version = desired.spec.sys_config_version();
        if !sys_version.is_empty() && status.assigned_sys_version() != sys_version {
            status.spec.sys_configs = desired
                .spec
                .sys_configs
                .as_ref()
                .map(ConfigBundle::with_swapped_grub_cmdline_roles);
            changed = true;
        }
        if changed {
            status = self.client.replace_machine_status(&status).await?;
        }

        if !rollback {
            self.apply_pending_upgrade_config(desired, status).await?;
        }

        let node = self.cordon(node).await?;
        if let Err(e) = drain_node(self.client.as_ref(), &self.node_name, desired.spec.evict_pod_force).await {
            warn!("Drain of node {} failed, uncordoning: {}", self.node_name, e);
            self.release(node, &[]).await?;
            return Err(e);
        }

        if rollback {
            info!("Rolling back node {} to {}", self.node_name, desired.spec.os_version);
            let result = self.agent.rollback().await;
            self.metrics.record_agent_call("rollback", result.is_ok());
            result?;
        } else {
            info!("Upgrading node {} to {}", self.node_name, desired.spec.os_version);
            let result = self.agent.update(&update_request(&desired.spec)).await;
            self.metrics.record_agent_call("update", result.is_ok());
            result?;
        }
        *self.last_dispatch.lock().await = Some(Dispatch {
            target: desired.spec.os_version.clone(),
            at: Instant::now(),
        });
        Ok(PassAction::Dispatched)
    }

    /// Whether `target` was handed to the agent less than one period ago.
    /// The agent reboots right after answering, so the same operation is
    /// not sent again while the machine goes down.
    async fn awaiting_reboot(&self, target: &str) -> bool {
        self.last_dispatch
            .lock()
            .await
            .as_ref()
            .is_some_and(|last| last.target == target && last.at.elapsed() < self.period)
    }

    async fn reconcile_config(
        &self,
        desired: &DesiredState,
        node: Node,
        mut status: MachineStatus,
    ) -> Result<PassAction, ControllerError> {
        if !node_has_label(&node, LABEL_CONFIGURING) {
            return Ok(PassAction::Idle);
        }

        let desired_version = desired.spec.sys_config_version();
        if desired_version == status.applied_sys_version() {
            if status.assigned_sys_version() != desired_version {
                info!(
                    "SysConfig of node {} reverted to applied version {}",
                    self.node_name, desired_version
                );
                status.spec.sys_configs = status.status.as_ref().and_then(|s| s.sys_configs.clone());
            }
            status.spec.node_status = NodeStatus::Idle;
            self.client.replace_machine_status(&status).await?;
            self.release(node, &[LABEL_CONFIGURING]).await?;
            return Ok(PassAction::Released);
        }

        if status.assigned_sys_version() != desired_version {
            status.spec.sys_configs = desired.spec.sys_configs.clone();
        }
        status.spec.node_status = NodeStatus::Configuring;
        let status = self.client.replace_machine_status(&status).await?;

        let bundle = status.spec.sys_configs.clone().unwrap_or_default();
        let status = self.configure(status, bundle, BundleSlot::Sys).await?;
        self.set_node_status(status, NodeStatus::Idle).await?;
        self.release(node, &[LABEL_CONFIGURING]).await?;
        Ok(PassAction::Released)
    }

    /// Removes whichever of `labels` the node holds, resets NodeStatus and
    /// undoes our cordon.
    async fn drop_claims(
        &self,
        node: Node,
        status: MachineStatus,
        labels: &[&str],
    ) -> Result<PassAction, ControllerError> {
        let held: Vec<&str> = labels.iter().copied().filter(|label| node_has_label(&node, label)).collect();
        self.set_node_status(status, NodeStatus::Idle).await?;
        self.release(node, &held).await?;
        if held.is_empty() {
            return Ok(PassAction::Idle);
        }
        info!("Dropped {:?} from node {}", held, self.node_name);
        Ok(PassAction::Released)
    }

    /// Applies the assigned SysConfig once the new OS is running.
    async fn apply_pending_sys_config(
        &self,
        desired: &DesiredState,
        mut status: MachineStatus,
    ) -> Result<MachineStatus, ControllerError> {
        let version = desired.spec.sys_config_version();
        if version.is_empty() || version == status.applied_sys_version() {
            return Ok(status);
        }
        if status.assigned_sys_version() != version {
            status.spec.sys_configs = desired.spec.sys_configs.clone();
            status = self.client.replace_machine_status(&status).await?;
        }
        let bundle = status.spec.sys_configs.clone().unwrap_or_default();
        self.configure(status, bundle, BundleSlot::Sys).await
    }

    /// Applies the UpgradeConfig before the partition switch.
    async fn apply_pending_upgrade_config(
        &self,
        desired: &DesiredState,
        mut status: MachineStatus,
    ) -> Result<MachineStatus, ControllerError> {
        let version = desired.spec.upgrade_config_version();
        if version.is_empty() || version == status.applied_upgrade_version() {
            return Ok(status);
        }
        if status.assigned_upgrade_version() != version {
            status.spec.upgrade_configs = desired.spec.upgrade_configs.clone();
            status = self.client.replace_machine_status(&status).await?;
        }
        let bundle = status.spec.upgrade_configs.clone().unwrap_or_default();
        self.configure(status, bundle, BundleSlot::Upgrade).await
    }

    /// Sends a bundle to the agent and records it as applied.
    async fn configure(
        &self,
        mut status: MachineStatus,
        bundle: ConfigBundle,
        slot: BundleSlot,
    ) -> Result<MachineStatus, ControllerError> {
        info!("Applying {:?} config {} on node {}", slot, bundle.version, self.node_name);
        let result = self.agent.configure(&configure_request(&bundle)).await;
        self.metrics.record_agent_call("configure", result.is_ok());
        result?;

        let applied = status.status.get_or_insert_with(Default::default);
        match slot {
            BundleSlot::Sys => applied.sys_configs = Some(bundle),
            BundleSlot::Upgrade => applied.upgrade_configs = Some(bundle),
        }
        Ok(self.client.replace_machine_status_status(&status).await?)
    }

    async fn set_node_status(
        &self,
        mut status: MachineStatus,
        node_status: NodeStatus,
    ) -> Result<MachineStatus, ControllerError> {
        if status.spec.node_status == node_status {
            return Ok(status);
        }
        status.spec.node_status = node_status;
        Ok(self.client.replace_machine_status(&status).await?)
    }

    /// Marks the node unschedulable. A node that is already unschedulable
    /// was cordoned by someone else and is left without our annotation.
    async fn cordon(&self, mut node: Node) -> Result<Node, ControllerError> {
        if node_is_unschedulable(&node) {
            return Ok(node);
        }
        set_node_unschedulable(&mut node, true);
        set_node_annotation(&mut node, ANNOTATION_CORDONED_BY_PROXY, "true");
        info!("Cordoned node {}", self.node_name);
        Ok(self.client.replace_node(&node).await?)
    }

    /// Removes `labels` and undoes our own cordon, in one write.
    async fn release(&self, mut node: Node, labels: &[&str]) -> Result<Node, ControllerError> {
        let mut changed = false;
        for label in labels {
            changed |= remove_node_label(&mut node, label);
        }
        if remove_node_annotation(&mut node, ANNOTATION_CORDONED_BY_PROXY) {
            set_node_unschedulable(&mut node, false);
            info!("Uncordoned node {}", self.node_name);
            changed = true;
        }
        if !changed {
            return Ok(node);
        }
        Ok(self.client.replace_node(&node).await?)
    }
}

#[derive(Debug, Clone, Copy)]
enum BundleSlot {
    Sys,
    Upgrade,
}

#[cfg(test)]
#[path = "reconciler_test.rs"]
mod tests;
