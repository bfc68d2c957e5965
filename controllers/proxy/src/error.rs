//! Controller-specific error types.

use agent_client::AgentError;
use cluster_client::ClusterError;
use probes::ProbeError;
use thiserror::Error;

/// Errors that can occur in the proxy.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Resource store error
    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    /// Node agent call failed
    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    /// Workloads could not be moved off the node
    #[error("Drain failed: {0}")]
    Drain(String),

    /// Probe or metrics server error
    #[error("Probe server error: {0}")]
    Probe(#[from] ProbeError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

impl ControllerError {
    /// Errors expected to clear up by themselves on a later pass
    pub fn is_transient(&self) -> bool {
        match self {
            ControllerError::Cluster(e) => e.is_conflict(),
            ControllerError::Agent(e) => e.is_transient(),
            _ => false,
        }
    }
}
