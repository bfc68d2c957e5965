//! Main controller implementation.
//!
//! Runs the node controller and the probe server as background tasks and
//! stops when either of them exits.

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::watcher::Watcher;
use agent_client::AgentClient;
use cluster_client::KubeClusterClient;
use kube::Api;
use probes::{Metrics, ProbeState};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// Proxy settings read from the environment
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub node_name: String,
    pub agent_socket: PathBuf,
    pub agent_timeout: Duration,
    pub reconcile_period: Duration,
    pub probe_addr: SocketAddr,
}

/// Main controller for one node.
pub struct Controller {
    node_controller: JoinHandle<Result<(), ControllerError>>,
    probe_server: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(config: ProxyConfig) -> Result<Self, ControllerError> {
        info!("Initializing FleetOS proxy for node {}", config.node_name);

        let cluster = KubeClusterClient::try_default().await?;
        let kube_client = cluster.kube_client();
        let agent = AgentClient::new(config.agent_socket.clone(), config.agent_timeout);

        let metrics = Metrics::new()?;
        let probe_state = ProbeState::new(metrics.clone());

        let reconciler = Arc::new(Reconciler::new(
            Arc::new(cluster),
            Arc::new(agent),
            config.node_name.clone(),
            metrics,
            config.reconcile_period,
        ));

        let watcher = Watcher::new(
            config.node_name.clone(),
            Api::all(kube_client.clone()),
            Api::all(kube_client.clone()),
            Api::all(kube_client),
        );
        let node_controller = {
            let probe_state = probe_state.clone();
            tokio::spawn(async move {
                probe_state.set_ready(true);
                watcher.run(reconciler).await
            })
        };

        let probe_server = tokio::spawn(async move {
            probes::serve_probes(config.probe_addr, probe_state, probes::shutdown_signal())
                .await
                .map_err(ControllerError::from)
        });

        Ok(Self {
            node_controller,
            probe_server,
        })
    }

    /// Runs the controller until shutdown.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("FleetOS proxy running");

        tokio::select! {
            result = &mut self.node_controller => {
                result.map_err(|e| ControllerError::Watch(format!("Node controller panicked: {}", e)))??;
            }
            result = &mut self.probe_server => {
                result.map_err(|e| ControllerError::Watch(format!("Probe server panicked: {}", e)))??;
                info!("Shutdown signal received");
            }
        }

        Ok(())
    }
}
