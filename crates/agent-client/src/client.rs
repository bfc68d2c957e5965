//! Unix socket agent client

use crate::agent_trait::AgentClientTrait;
use crate::backoff::ConnectBackoff;
use crate::error::AgentError;
use crate::framing::{read_message, write_message};
use crate::protocol::{AgentRequest, AgentResponse, ConfigureRequest, UpdateRequest};
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::UnixStream;
use tracing::{debug, warn};

/// Default number of connection attempts per call
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 5;

/// Client for the node agent's local socket
///
/// Each call opens a fresh connection, sends one request frame and waits for
/// one response frame. The whole call, connection attempts included, is
/// bounded by `timeout`.
#[derive(Debug, Clone)]
pub struct AgentClient {
    socket_path: PathBuf,
    timeout: Duration,
    connect_attempts: u32,
    backoff: ConnectBackoff,
}

impl AgentClient {
    /// Create a client for the socket at `socket_path`
    pub fn new(socket_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout,
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
            backoff: ConnectBackoff::default(),
        }
    }

    /// Override the connection retry policy
    #[must_use]
    pub fn with_connect_policy(mut self, attempts: u32, backoff: ConnectBackoff) -> Self {
        self.connect_attempts = attempts.max(1);
        self.backoff = backoff;
        self
    }

    async fn connect(&self) -> Result<UnixStream, AgentError> {
        let mut backoff = self.backoff.clone();
        let mut attempt = 1;
        loop {
            match UnixStream::connect(&self.socket_path).await {
                Ok(stream) => return Ok(stream),
                Err(e) if attempt < self.connect_attempts => {
                    let delay = backoff.next_delay();
                    debug!(
                        "Connect to {} failed (attempt {}): {}, retrying in {:?}",
                        self.socket_path.display(),
                        attempt,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(AgentError::Connect(format!(
                        "{}: {}",
                        self.socket_path.display(),
                        e
                    )));
                }
            }
        }
    }

    async fn exchange(&self, request: &AgentRequest) -> Result<AgentResponse, AgentError> {
        let mut stream = self.connect().await?;
        write_message(&mut stream, request).await?;
        read_message(&mut stream).await
    }

    /// Sends one request and maps the response into a result
    pub async fn call(&self, request: &AgentRequest) -> Result<(), AgentError> {
        let method = request.method();
        debug!("Calling agent method {}", method);
        let response = tokio::time::timeout(self.timeout, self.exchange(request))
            .await
            .map_err(|_elapsed| AgentError::Timeout(self.timeout))??;
        match response {
            AgentResponse::Ok => Ok(()),
            AgentResponse::Error { kind, message } => {
                warn!("Agent method {} failed ({:?}): {}", method, kind, message);
                Err(AgentError::from_remote(kind, message))
            }
        }
    }
}

#[async_trait::async_trait]
impl AgentClientTrait for AgentClient {
    async fn update(&self, request: &UpdateRequest) -> Result<(), AgentError> {
        self.call(&AgentRequest::Update(request.clone())).await
    }

    async fn rollback(&self) -> Result<(), AgentError> {
        self.call(&AgentRequest::Rollback).await
    }

    async fn configure(&self, request: &ConfigureRequest) -> Result<(), AgentError> {
        self.call(&AgentRequest::Configure(request.clone())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentErrorKind;
    use std::path::Path;
    use tokio::net::UnixListener;

    fn fast_client(path: &Path, timeout: Duration) -> AgentClient {
        AgentClient::new(path, timeout).with_connect_policy(2, ConnectBackoff::new(1, 1))
    }

    #[tokio::test]
    async fn test_missing_socket_is_connect_error() {
        let dir = tempfile::tempdir().unwrap();
        let client = fast_client(&dir.path().join("absent.sock"), Duration::from_secs(5));
        let err = client.rollback().await.unwrap_err();
        assert!(matches!(err, AgentError::Connect(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_busy_response_maps_to_busy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.sock");
        let listener = UnixListener::bind(&path).unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let _req: AgentRequest = read_message(&mut stream).await.unwrap();
            let resp = AgentResponse::Error {
                kind: AgentErrorKind::Busy,
                message: "locked".to_string(),
            };
            write_message(&mut stream, &resp).await.unwrap();
        });

        let client = fast_client(&path, Duration::from_secs(5));
        let err = client.rollback().await.unwrap_err();
        assert!(matches!(err, AgentError::Busy));
    }

    #[tokio::test]
    async fn test_silent_agent_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(stream);
        });

        let client = fast_client(&path, Duration::from_millis(100));
        let err = client.configure(&ConfigureRequest::default()).await.unwrap_err();
        assert!(matches!(err, AgentError::Timeout(_)));
        server.abort();
    }
}
