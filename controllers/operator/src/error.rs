//! Controller-specific error types.

use crate::time_window::TimeWindowError;
use cluster_client::ClusterError;
use probes::ProbeError;
use thiserror::Error;

/// Errors that can occur in the operator.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Resource store error
    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    /// Malformed dispatch window on a DesiredState
    #[error("Invalid time window: {0}")]
    TimeWindow(#[from] TimeWindowError),

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
