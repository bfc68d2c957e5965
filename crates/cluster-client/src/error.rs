//! Cluster client errors

use thiserror::Error;

/// Errors that can occur when talking to the resource store
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Transport or API error that does not fall in a more specific variant
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Optimistic-concurrency conflict; re-read and retry on the next pass
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Object is missing a field the caller relies on
    #[error("Invalid object: {0}")]
    InvalidObject(String),

    /// JSON serialization error while building a request
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClusterError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ClusterError::Conflict(_))
    }

    /// Maps API status codes onto the typed variants.
    pub(crate) fn from_kube(err: kube::Error, what: &str) -> Self {
        match err {
            kube::Error::Api(ref status) if status.code == 404 => ClusterError::NotFound(what.to_string()),
            kube::Error::Api(ref status) if status.code == 409 => ClusterError::Conflict(what.to_string()),
            other => ClusterError::Kube(other),
        }
    }
}
