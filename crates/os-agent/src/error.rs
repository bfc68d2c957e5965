//! Agent execution errors

use crate::runner::CommandError;
use agent_client::AgentErrorKind;
use thiserror::Error;

/// Errors raised while executing an agent request
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Another request holds the execution lock
    #[error("another operation is in progress")]
    Busy,

    /// Request is malformed or refers to something the agent does not know
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A referenced certificate is missing or unreadable
    #[error("certificate error: {0}")]
    Certificate(String),

    /// Image content does not match the expected checksum
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    Integrity { expected: String, actual: String },

    /// Image could not be fetched or prepared
    #[error("image error: {0}")]
    Image(String),

    /// Partition write or boot entry switch failed
    #[error("partition error: {0}")]
    Partition(String),

    /// A config applier failed
    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ExecutorError {
    /// Category reported to the caller
    pub fn kind(&self) -> AgentErrorKind {
        match self {
            ExecutorError::Busy => AgentErrorKind::Busy,
            ExecutorError::InvalidRequest(_) | ExecutorError::Certificate(_) => AgentErrorKind::InvalidRequest,
            ExecutorError::Integrity { .. } => AgentErrorKind::Integrity,
            ExecutorError::Image(_) | ExecutorError::Http(_) => AgentErrorKind::Image,
            ExecutorError::Partition(_) => AgentErrorKind::Partition,
            ExecutorError::Config(_) => AgentErrorKind::Config,
            ExecutorError::Command(_) | ExecutorError::Io(_) => AgentErrorKind::Internal,
        }
    }
}
