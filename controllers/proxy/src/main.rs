//! FleetOS Proxy
//!
//! Per-node reconciler. Runs on every node, watches the `DesiredState`
//! targeting it and its own `MachineStatus`, drains the node when it is
//! claimed and drives the local os-agent over its Unix socket.

mod controller;
mod convert;
mod drain;
mod error;
mod reconciler;
#[cfg(test)]
mod test_utils;
mod watcher;

use crate::controller::{Controller, ProxyConfig};
use crate::error::ControllerError;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

fn env_secs(name: &str, default: u64) -> Result<Duration, ControllerError> {
    let secs = env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse::<u64>()
        .map_err(|e| ControllerError::InvalidConfig(format!("{}: {}", name, e)))?;
    if secs == 0 {
        return Err(ControllerError::InvalidConfig(format!("{} must be positive", name)));
    }
    Ok(Duration::from_secs(secs))
}

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    probes::init_tracing();
    let _ = rustls::crypto::ring::default_provider().install_default();

    info!("Starting FleetOS proxy");

    // Load configuration from environment variables
    let node_name = env::var("NODE_NAME").map_err(|_| {
        ControllerError::InvalidConfig("NODE_NAME environment variable is required".to_string())
    })?;
    let agent_socket = PathBuf::from(
        env::var("AGENT_SOCKET").unwrap_or_else(|_| "/run/os-agent/os-agent.sock".to_string()),
    );
    let reconcile_period = env_secs("RECONCILE_PERIOD_SECS", 15)?;
    let agent_timeout = env_secs("AGENT_TIMEOUT_SECS", 30)?;
    let probe_addr = env::var("PROBE_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8082".to_string())
        .parse::<SocketAddr>()
        .map_err(|e| ControllerError::InvalidConfig(format!("PROBE_ADDR: {}", e)))?;

    info!("Configuration:");
    info!("  Node: {}", node_name);
    info!("  Agent socket: {}", agent_socket.display());
    info!("  Reconcile period: {:?}", reconcile_period);
    info!("  Agent timeout: {:?}", agent_timeout);
    info!("  Probe address: {}", probe_addr);

    // Initialize and run controller
    let controller = Controller::new(ProxyConfig {
        node_name,
        agent_socket,
        agent_timeout,
        reconcile_period,
        probe_addr,
    })
    .await?;
    controller.run().await?;

    Ok(())
}
