//! FleetOS Operator
//!
//! Cluster-level batch scheduler for OS upgrades, rollbacks and
//! configuration changes.
//!
//! This controller watches `DesiredState` resources and the node fleet, and
//! labels nodes for work while keeping the number of nodes in flight within
//! each rollout's `maxUnavailable` budget.

mod controller;
mod error;
mod reconciler;
#[cfg(test)]
mod test_utils;
mod time_window;
mod watcher;

use crate::controller::{Controller, OperatorConfig};
use crate::error::ControllerError;
use std::env;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    probes::init_tracing();
    let _ = rustls::crypto::ring::default_provider().install_default();

    info!("Starting FleetOS operator");

    // Load configuration from environment variables
    let reconcile_period = env::var("RECONCILE_PERIOD_SECS")
        .unwrap_or_else(|_| "15".to_string())
        .parse::<u64>()
        .map_err(|e| ControllerError::InvalidConfig(format!("RECONCILE_PERIOD_SECS: {}", e)))?;
    let probe_addr = env::var("PROBE_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8081".to_string())
        .parse::<SocketAddr>()
        .map_err(|e| ControllerError::InvalidConfig(format!("PROBE_ADDR: {}", e)))?;
    if reconcile_period == 0 {
        return Err(ControllerError::InvalidConfig("RECONCILE_PERIOD_SECS must be positive".to_string()));
    }

    info!("Configuration:");
    info!("  Reconcile period: {}s", reconcile_period);
    info!("  Probe address: {}", probe_addr);

    // Initialize and run controller
    let controller = Controller::new(OperatorConfig {
        reconcile_period: Duration::from_secs(reconcile_period),
        probe_addr,
    })
    .await?;
    controller.run().await?;

    Ok(())
}
