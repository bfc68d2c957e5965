//! Mock AgentClient for unit testing
//!
//! Records every request and returns either success, a busy rejection, or
//! a scripted remote failure.

use crate::agent_trait::AgentClientTrait;
use crate::error::{AgentError, AgentErrorKind};
use crate::protocol::{AgentRequest, ConfigureRequest, UpdateRequest};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
enum Scripted {
    Busy,
    Timeout,
    Remote(AgentErrorKind, String),
}

/// Mock AgentClient for testing
#[derive(Debug, Clone, Default)]
pub struct MockAgentClient {
    calls: Arc<Mutex<Vec<AgentRequest>>>,
    failure: Arc<Mutex<Option<Scripted>>>,
}

impl MockAgentClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests received so far, in order
    pub fn calls(&self) -> Vec<AgentRequest> {
        self.calls.lock().unwrap().clone()
    }

    /// Method names received so far, in order
    pub fn methods(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().iter().map(AgentRequest::method).collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Every call is rejected as busy until `succeed` is called
    pub fn set_busy(&self) {
        *self.failure.lock().unwrap() = Some(Scripted::Busy);
    }

    /// Every call times out until `succeed` is called
    pub fn set_timeout(&self) {
        *self.failure.lock().unwrap() = Some(Scripted::Timeout);
    }

    /// Every call fails remotely until `succeed` is called
    pub fn fail_with(&self, kind: AgentErrorKind, message: &str) {
        *self.failure.lock().unwrap() = Some(Scripted::Remote(kind, message.to_string()));
    }

    pub fn succeed(&self) {
        *self.failure.lock().unwrap() = None;
    }

    fn record(&self, request: AgentRequest) -> Result<(), AgentError> {
        self.calls.lock().unwrap().push(request);
        match self.failure.lock().unwrap().clone() {
            None => Ok(()),
            Some(Scripted::Busy) => Err(AgentError::Busy),
            Some(Scripted::Timeout) => Err(AgentError::Timeout(std::time::Duration::from_secs(30))),
            Some(Scripted::Remote(kind, message)) => Err(AgentError::from_remote(kind, message)),
        }
    }
}

#[async_trait::async_trait]
impl AgentClientTrait for MockAgentClient {
    async fn update(&self, request: &UpdateRequest) -> Result<(), AgentError> {
        self.record(AgentRequest::Update(request.clone()))
    }

    async fn rollback(&self) -> Result<(), AgentError> {
        self.record(AgentRequest::Rollback)
    }

    async fn configure(&self, request: &ConfigureRequest) -> Result<(), AgentError> {
        self.record(AgentRequest::Configure(request.clone()))
    }
}
