//! AgentClient trait for mocking
//!
//! The proxy talks to the node agent through this trait so its reconcile
//! logic can be tested without a socket. `AgentClient` implements it over
//! the Unix socket; tests use `MockAgentClient`.

use crate::error::AgentError;
use crate::protocol::{ConfigureRequest, UpdateRequest};

/// Machine-local executor operations
///
/// Calls block until the agent finishes the operation. `Update` and
/// `Rollback` end in a reboot on success, so callers may also see the
/// connection drop.
#[async_trait::async_trait]
pub trait AgentClientTrait: Send + Sync {
    async fn update(&self, request: &UpdateRequest) -> Result<(), AgentError>;
    async fn rollback(&self) -> Result<(), AgentError>;
    async fn configure(&self, request: &ConfigureRequest) -> Result<(), AgentError>;
}
