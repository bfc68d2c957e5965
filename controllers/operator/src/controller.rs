//! Main controller implementation.
//!
//! Runs the DesiredState controller and the probe server as background
//! tasks and stops when either of them exits.

use crate::error::ControllerError;
use crate::reconciler::Scheduler;
use crate::watcher::Watcher;
use cluster_client::KubeClusterClient;
use crds::DesiredState;
use k8s_openapi::api::core::v1::Node;
use kube::Api;
use probes::{Metrics, ProbeState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// Operator settings read from the environment
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    pub reconcile_period: Duration,
    pub probe_addr: SocketAddr,
}

/// Main controller for fleet scheduling.
pub struct Controller {
    desired_state_controller: JoinHandle<Result<(), ControllerError>>,
    probe_server: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(config: OperatorConfig) -> Result<Self, ControllerError> {
        info!("Initializing FleetOS operator");

        let cluster = KubeClusterClient::try_default().await?;
        let kube_client = cluster.kube_client();

        let metrics = Metrics::new()?;
        let probe_state = ProbeState::new(metrics.clone());

        let scheduler = Arc::new(Scheduler::new(Arc::new(cluster), metrics, config.reconcile_period));
        let watcher = Watcher::new(Api::<DesiredState>::all(kube_client.clone()), Api::<Node>::all(kube_client));

        let desired_state_controller = {
            let probe_state = probe_state.clone();
            tokio::spawn(async move {
                probe_state.set_ready(true);
                watcher.run(scheduler).await
            })
        };

        let probe_server = tokio::spawn(async move {
            probes::serve_probes(config.probe_addr, probe_state, probes::shutdown_signal())
                .await
                .map_err(ControllerError::from)
        });

        Ok(Self {
            desired_state_controller,
            probe_server,
        })
    }

    /// Runs the controller until shutdown.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("FleetOS operator running");

        tokio::select! {
            result = &mut self.desired_state_controller => {
                result.map_err(|e| ControllerError::Watch(format!("DesiredState controller panicked: {}", e)))??;
            }
            result = &mut self.probe_server => {
                result.map_err(|e| ControllerError::Watch(format!("Probe server panicked: {}", e)))??;
                info!("Shutdown signal received");
            }
        }

        Ok(())
    }
}
