//! FleetOS node agent binary
//!
//! Runs as root on every machine and serves `Update`, `Rollback` and
//! `Configure` requests on a local Unix socket.

use anyhow::Result;
use os_agent::{AgentConfig, AgentServer, Executor, HostRunner};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    probes::init_tracing();
    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = AgentConfig::from_env().map_err(anyhow::Error::msg)?;
    info!(
        "Starting os-agent (socket={}, partitions={}/{})",
        config.socket_path.display(),
        config.partition_a.display(),
        config.partition_b.display()
    );

    let executor = Arc::new(Executor::new(&config, Arc::new(HostRunner)));
    let server = AgentServer::bind(&config.socket_path, executor)?;
    server.serve(probes::shutdown_signal()).await?;

    info!("os-agent stopped");
    Ok(())
}
