//! Agent client errors

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Failure category reported by the agent over the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentErrorKind {
    /// Another operation holds the execution lock
    Busy,
    /// Malformed request, unknown config model, missing certificate
    InvalidRequest,
    /// Downloaded or pulled image does not match the expected checksum
    Integrity,
    /// Image acquisition failed (transfer, disk space, container tooling)
    Image,
    /// Partition write or bootloader update failed
    Partition,
    /// A config applier failed
    Config,
    /// Anything else
    Internal,
}

/// Errors returned by `AgentClientTrait` calls
#[derive(Debug, Error)]
pub enum AgentError {
    /// Could not connect to the agent socket
    #[error("Connect error: {0}")]
    Connect(String),

    /// I/O error on an established connection
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The call did not complete within the configured timeout
    #[error("Agent call timed out after {0:?}")]
    Timeout(Duration),

    /// Malformed frame
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The agent is already executing an operation
    #[error("Agent is busy")]
    Busy,

    /// The agent ran the request and it failed
    #[error("Agent error ({kind:?}): {message}")]
    Remote { kind: AgentErrorKind, message: String },
}

impl AgentError {
    /// Connection problems, timeouts and busy rejections are retried on the
    /// next reconcile pass without touching machine state.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AgentError::Connect(_) | AgentError::Io(_) | AgentError::Timeout(_) | AgentError::Busy
        )
    }

    /// Maps a wire error back into a client error
    pub fn from_remote(kind: AgentErrorKind, message: String) -> Self {
        match kind {
            AgentErrorKind::Busy => AgentError::Busy,
            kind => AgentError::Remote { kind, message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_is_transient() {
        let err = AgentError::from_remote(AgentErrorKind::Busy, "locked".to_string());
        assert!(matches!(err, AgentError::Busy));
        assert!(err.is_transient());
    }

    #[test]
    fn test_remote_failure_is_not_transient() {
        let err = AgentError::from_remote(AgentErrorKind::Integrity, "checksum mismatch".to_string());
        assert!(!err.is_transient());
        assert!(err.to_string().contains("checksum mismatch"));
    }
}
