//! Unit tests for the proxy reconciler

use super::*;
use crate::test_utils::{bundle, create_test_desired_state, create_test_node, create_test_pod};
use agent_client::{AgentErrorKind, AgentRequest, MockAgentClient};
use cluster_client::{node_has_annotation, MockClusterClient};
use crds::{AppliedConfigs, GRUB_CMDLINE_CURRENT, GRUB_CMDLINE_NEXT, LABEL_NODE_SELECTOR};

const NODE: &str = "worker-0";
const PERIOD: Duration = Duration::from_secs(15);

struct Fixture {
    client: MockClusterClient,
    agent: MockAgentClient,
    reconciler: Reconciler,
}

fn fixture() -> Fixture {
    let client = MockClusterClient::new();
    let agent = MockAgentClient::new();
    let reconciler = Reconciler::new(
        Arc::new(client.clone()),
        Arc::new(agent.clone()),
        NODE.to_string(),
        Metrics::new().unwrap(),
        PERIOD,
    );
    Fixture { client, agent, reconciler }
}

fn node(f: &Fixture) -> Node {
    f.client.node(NODE).unwrap()
}

fn machine_status(f: &Fixture) -> MachineStatus {
    f.client.machine_status(NODE).unwrap()
}

#[tokio::test]
async fn test_creates_machine_status_when_missing() {
    let f = fixture();
    f.client.add_node(create_test_node(NODE, "FleetOS 1.0", &[]));

    assert_eq!(f.reconciler.reconcile().await.unwrap(), PassAction::Idle);
    let status = machine_status(&f);
    assert_eq!(status.node_status(), NodeStatus::Idle);
    assert_eq!(status.assigned_sys_version(), "");
}

#[tokio::test]
async fn test_unclaimed_node_is_left_alone() {
    let f = fixture();
    f.client.add_node(create_test_node(NODE, "FleetOS 1.0", &[]));
    f.client.add_desired_state(create_test_desired_state("rollout", "FleetOS 2.0"));

    assert_eq!(f.reconciler.reconcile().await.unwrap(), PassAction::Idle);
    assert!(f.agent.calls().is_empty());
    assert!(!node_is_unschedulable(&node(&f)));
}

#[tokio::test]
async fn test_selector_mismatch_is_idle() {
    let f = fixture();
    f.client.add_node(create_test_node(NODE, "FleetOS 1.0", &[]));
    let mut desired = create_test_desired_state("edge", "FleetOS 2.0");
    desired.spec.node_selector = Some("edge".to_string());
    f.client.add_desired_state(desired);

    assert_eq!(f.reconciler.reconcile().await.unwrap(), PassAction::Idle);
    assert!(f.agent.calls().is_empty());
    assert!(!node_has_label(&node(&f), LABEL_NODE_SELECTOR));
}

#[tokio::test]
async fn test_claim_dropped_when_desired_state_deleted() {
    let f = fixture();
    let mut node_obj = create_test_node(NODE, "FleetOS 1.0", &[LABEL_UPGRADING]);
    set_node_unschedulable(&mut node_obj, true);
    set_node_annotation(&mut node_obj, ANNOTATION_CORDONED_BY_PROXY, "true");
    f.client.add_node(node_obj);
    let mut status = MachineStatus::for_node(NODE);
    status.spec.node_status = NodeStatus::Upgrading;
    f.client.add_machine_status(status);

    assert_eq!(f.reconciler.reconcile().await.unwrap(), PassAction::Released);

    assert!(f.agent.calls().is_empty());
    let node = node(&f);
    assert!(!node_has_label(&node, LABEL_UPGRADING));
    assert!(!node_is_unschedulable(&node));
    assert!(!node_has_annotation(&node, ANNOTATION_CORDONED_BY_PROXY));
    assert_eq!(machine_status(&f).node_status(), NodeStatus::Idle);
}

#[tokio::test]
async fn test_claim_dropped_when_selector_stops_matching() {
    let f = fixture();
    f.client.add_node(create_test_node(NODE, "FleetOS 1.0", &[LABEL_UPGRADING]));
    let mut desired = create_test_desired_state("edge", "FleetOS 2.0");
    desired.spec.node_selector = Some("edge".to_string());
    f.client.add_desired_state(desired);

    assert_eq!(f.reconciler.reconcile().await.unwrap(), PassAction::Released);
    assert!(f.agent.calls().is_empty());
    assert!(!node_has_label(&node(&f), LABEL_UPGRADING));
}

#[tokio::test]
async fn test_configuring_claim_dropped_when_ops_type_becomes_upgrade() {
    let f = fixture();
    f.client.add_node(create_test_node(NODE, "FleetOS 1.0", &[LABEL_CONFIGURING]));
    f.client.add_desired_state(create_test_desired_state("rollout", "FleetOS 2.0"));
    let mut status = MachineStatus::for_node(NODE);
    status.spec.node_status = NodeStatus::Configuring;
    f.client.add_machine_status(status);

    assert_eq!(f.reconciler.reconcile().await.unwrap(), PassAction::Released);

    assert!(f.agent.calls().is_empty());
    assert!(!node_has_label(&node(&f), LABEL_CONFIGURING));
    assert_eq!(machine_status(&f).node_status(), NodeStatus::Idle);

    // with the stale claim gone the node is just unclaimed
    assert_eq!(f.reconciler.reconcile().await.unwrap(), PassAction::Idle);
}

#[tokio::test]
async fn test_upgrading_claim_dropped_when_ops_type_becomes_config() {
    let f = fixture();
    f.client.add_node(create_test_node(NODE, "FleetOS 1.0", &[LABEL_UPGRADING]));
    let mut desired = create_test_desired_state("tuning", "FleetOS 1.0");
    desired.spec.ops_type = OperationKind::Config;
    desired.spec.sys_configs = Some(bundle("s2", "kernel.sysctl", "vm.swappiness", "10"));
    f.client.add_desired_state(desired);

    assert_eq!(f.reconciler.reconcile().await.unwrap(), PassAction::Released);
    assert!(f.agent.calls().is_empty());
    assert!(!node_has_label(&node(&f), LABEL_UPGRADING));
}

#[tokio::test]
async fn test_dispatch_not_repeated_before_reboot() {
    let f = fixture();
    f.client.add_node(create_test_node(NODE, "FleetOS 1.0", &[LABEL_UPGRADING]));
    f.client.add_desired_state(create_test_desired_state("rollout", "FleetOS 2.0"));

    assert_eq!(f.reconciler.reconcile().await.unwrap(), PassAction::Dispatched);
    assert_eq!(f.reconciler.reconcile().await.unwrap(), PassAction::AwaitingReboot);
    assert_eq!(f.agent.methods(), vec!["update"]);
}

#[tokio::test]
async fn test_controller_requeues_after_period() {
    let f = fixture();
    f.client.add_node(create_test_node(NODE, "FleetOS 1.0", &[]));

    assert_eq!(f.reconciler.reconcile_node().await.unwrap(), Action::requeue(PERIOD));

    let err = ControllerError::Agent(agent_client::AgentError::Busy);
    assert_eq!(f.reconciler.error_policy(&err), Action::requeue(PERIOD));
}

#[tokio::test]
async fn test_claimed_node_is_drained_and_updated() {
    let f = fixture();
    f.client.add_node(create_test_node(NODE, "FleetOS 1.0", &[LABEL_UPGRADING]));
    f.client.add_pod(create_test_pod("web-1", NODE, Some("ReplicaSet")));
    f.client.add_pod(create_test_pod("fluentd-x", NODE, Some("DaemonSet")));
    let mut desired = create_test_desired_state("rollout", "FleetOS 2.0");
    desired.spec.sys_configs = Some(bundle("s1", GRUB_CMDLINE_CURRENT, "panic", "5"));
    desired.spec.upgrade_configs = Some(bundle("u1", "kernel.sysctl.persist", "vm.swappiness", "10"));
    f.client.add_desired_state(desired);

    assert_eq!(f.reconciler.reconcile().await.unwrap(), PassAction::Dispatched);

    assert_eq!(f.agent.methods(), vec!["configure", "update"]);
    match &f.agent.calls()[1] {
        AgentRequest::Update(update) => {
            assert_eq!(update.version, "FleetOS 2.0");
            assert_eq!(update.checksum, "abc123");
            assert_eq!(update.certs.ca_cert.as_deref(), Some("ca.pem"));
        }
        other => panic!("unexpected request {other:?}"),
    }

    let node = node(&f);
    assert!(node_is_unschedulable(&node));
    assert!(node_has_annotation(&node, ANNOTATION_CORDONED_BY_PROXY));
    assert!(node_has_label(&node, LABEL_UPGRADING));
    assert_eq!(f.client.evicted_pods(), vec!["default/web-1"]);

    let status = machine_status(&f);
    assert_eq!(status.node_status(), NodeStatus::Upgrading);
    assert_eq!(status.assigned_sys_version(), "s1");
    assert_eq!(status.spec.sys_configs.as_ref().unwrap().configs[0].model, GRUB_CMDLINE_NEXT);
    // SysConfig waits for the new boot, UpgradeConfig is already applied
    assert_eq!(status.applied_sys_version(), "");
    assert_eq!(status.applied_upgrade_version(), "u1");
}

#[tokio::test]
async fn test_converged_node_applies_sys_config_and_releases() {
    let f = fixture();
    let mut rebooted = create_test_node(NODE, "FleetOS 2.0", &[LABEL_UPGRADING]);
    set_node_unschedulable(&mut rebooted, true);
    set_node_annotation(&mut rebooted, ANNOTATION_CORDONED_BY_PROXY, "true");
    f.client.add_node(rebooted);
    let mut desired = create_test_desired_state("rollout", "FleetOS 2.0");
    desired.spec.sys_configs = Some(bundle("s1", GRUB_CMDLINE_CURRENT, "panic", "5"));
    f.client.add_desired_state(desired);
    let mut status = MachineStatus::for_node(NODE);
    status.spec.node_status = NodeStatus::Upgrading;
    status.spec.sys_configs = Some(bundle("s1", GRUB_CMDLINE_NEXT, "panic", "5"));
    f.client.add_machine_status(status);

    assert_eq!(f.reconciler.reconcile().await.unwrap(), PassAction::Released);

    match &f.agent.calls()[..] {
        [AgentRequest::Configure(request)] => assert_eq!(request.configs[0].model, GRUB_CMDLINE_NEXT),
        other => panic!("unexpected calls {other:?}"),
    }
    let node = node(&f);
    assert!(!node_has_label(&node, LABEL_UPGRADING));
    assert!(!node_is_unschedulable(&node));
    assert!(!node_has_annotation(&node, ANNOTATION_CORDONED_BY_PROXY));
    let status = machine_status(&f);
    assert_eq!(status.node_status(), NodeStatus::Idle);
    assert_eq!(status.applied_sys_version(), "s1");
}

#[tokio::test]
async fn test_admin_cordon_is_preserved() {
    let f = fixture();
    let mut node_obj = create_test_node(NODE, "FleetOS 2.0", &[LABEL_UPGRADING]);
    set_node_unschedulable(&mut node_obj, true);
    f.client.add_node(node_obj);
    f.client.add_desired_state(create_test_desired_state("rollout", "FleetOS 2.0"));

    assert_eq!(f.reconciler.reconcile().await.unwrap(), PassAction::Released);
    let node = node(&f);
    assert!(!node_has_label(&node, LABEL_UPGRADING));
    assert!(node_is_unschedulable(&node));
}

#[tokio::test]
async fn test_agent_failure_keeps_claim() {
    let f = fixture();
    f.client.add_node(create_test_node(NODE, "FleetOS 1.0", &[LABEL_UPGRADING]));
    f.client.add_desired_state(create_test_desired_state("rollout", "FleetOS 2.0"));
    f.agent.fail_with(AgentErrorKind::Integrity, "checksum mismatch");

    let err = f.reconciler.reconcile().await.unwrap_err();
    assert!(matches!(err, ControllerError::Agent(_)));
    assert!(!err.is_transient());
    let node = node(&f);
    assert!(node_has_label(&node, LABEL_UPGRADING));
    assert!(node_is_unschedulable(&node));

    // the next pass retries and does not cordon twice
    f.agent.succeed();
    assert_eq!(f.reconciler.reconcile().await.unwrap(), PassAction::Dispatched);
    assert_eq!(f.agent.methods(), vec!["update", "update"]);
}

#[tokio::test]
async fn test_drain_failure_uncordons() {
    let f = fixture();
    f.client.add_node(create_test_node(NODE, "FleetOS 1.0", &[LABEL_UPGRADING]));
    f.client.add_pod(create_test_pod("scratch", NODE, None));
    f.client.add_desired_state(create_test_desired_state("rollout", "FleetOS 2.0"));

    let err = f.reconciler.reconcile().await.unwrap_err();
    assert!(matches!(err, ControllerError::Drain(_)));
    let node = node(&f);
    assert!(!node_is_unschedulable(&node));
    assert!(!node_has_annotation(&node, ANNOTATION_CORDONED_BY_PROXY));
    assert!(node_has_label(&node, LABEL_UPGRADING));
    assert!(f.agent.calls().is_empty());
}

#[tokio::test]
async fn test_forced_drain_evicts_unmanaged_pods() {
    let f = fixture();
    f.client.add_node(create_test_node(NODE, "FleetOS 1.0", &[LABEL_UPGRADING]));
    f.client.add_pod(create_test_pod("scratch", NODE, None));
    let mut desired = create_test_desired_state("rollout", "FleetOS 2.0");
    desired.spec.evict_pod_force = true;
    f.client.add_desired_state(desired);

    assert_eq!(f.reconciler.reconcile().await.unwrap(), PassAction::Dispatched);
    assert_eq!(f.client.evicted_pods(), vec!["default/scratch"]);
}

#[tokio::test]
async fn test_rollback_calls_rollback() {
    let f = fixture();
    f.client.add_node(create_test_node(NODE, "FleetOS 2.0", &[LABEL_UPGRADING]));
    let mut desired = create_test_desired_state("rollback", "FleetOS 1.0");
    desired.spec.ops_type = OperationKind::Rollback;
    desired.spec.upgrade_configs = Some(bundle("u1", "kernel.sysctl", "vm.swappiness", "10"));
    f.client.add_desired_state(desired);

    assert_eq!(f.reconciler.reconcile().await.unwrap(), PassAction::Dispatched);
    assert_eq!(f.agent.methods(), vec!["rollback"]);
    assert_eq!(machine_status(&f).node_status(), NodeStatus::RollingBack);
}

#[tokio::test]
async fn test_config_rollout_applies_and_releases() {
    let f = fixture();
    f.client.add_node(create_test_node(NODE, "FleetOS 1.0", &[LABEL_CONFIGURING]));
    let mut desired = create_test_desired_state("tuning", "FleetOS 1.0");
    desired.spec.ops_type = OperationKind::Config;
    desired.spec.sys_configs = Some(bundle("s2", "kernel.sysctl", "vm.swappiness", "10"));
    f.client.add_desired_state(desired);

    assert_eq!(f.reconciler.reconcile().await.unwrap(), PassAction::Released);

    assert_eq!(f.agent.methods(), vec!["configure"]);
    let node = node(&f);
    assert!(!node_has_label(&node, LABEL_CONFIGURING));
    assert!(!node_is_unschedulable(&node));
    let status = machine_status(&f);
    assert_eq!(status.assigned_sys_version(), "s2");
    assert_eq!(status.applied_sys_version(), "s2");
    assert_eq!(status.node_status(), NodeStatus::Idle);
}

#[tokio::test]
async fn test_config_busy_agent_keeps_claim() {
    let f = fixture();
    f.client.add_node(create_test_node(NODE, "FleetOS 1.0", &[LABEL_CONFIGURING]));
    let mut desired = create_test_desired_state("tuning", "FleetOS 1.0");
    desired.spec.ops_type = OperationKind::Config;
    desired.spec.sys_configs = Some(bundle("s2", "kernel.sysctl", "vm.swappiness", "10"));
    f.client.add_desired_state(desired);
    f.agent.set_busy();

    let err = f.reconciler.reconcile().await.unwrap_err();
    assert!(err.is_transient());
    assert!(node_has_label(&node(&f), LABEL_CONFIGURING));
    let status = machine_status(&f);
    assert_eq!(status.node_status(), NodeStatus::Configuring);
    assert_eq!(status.assigned_sys_version(), "s2");
    assert_eq!(status.applied_sys_version(), "");
}

#[tokio::test]
async fn test_reverted_config_version_unsticks_node() {
    let f = fixture();
    f.client.add_node(create_test_node(NODE, "FleetOS 1.0", &[LABEL_CONFIGURING]));
    let good = bundle("s1", "kernel.sysctl", "vm.swappiness", "60");
    let mut desired = create_test_desired_state("tuning", "FleetOS 1.0");
    desired.spec.ops_type = OperationKind::Config;
    desired.spec.sys_configs = Some(good.clone());
    f.client.add_desired_state(desired);
    let mut status = MachineStatus::for_node(NODE);
    status.spec.node_status = NodeStatus::Configuring;
    status.spec.sys_configs = Some(bundle("s2", "kernel.sysctl", "vm.bogus", "1"));
    status.status = Some(AppliedConfigs {
        sys_configs: Some(good),
        upgrade_configs: None,
    });
    f.client.add_machine_status(status);

    assert_eq!(f.reconciler.reconcile().await.unwrap(), PassAction::Released);
    assert!(f.agent.calls().is_empty());
    assert!(!node_has_label(&node(&f), LABEL_CONFIGURING));
    let status = machine_status(&f);
    assert_eq!(status.assigned_sys_version(), "s1");
    assert_eq!(status.node_status(), NodeStatus::Idle);
}
